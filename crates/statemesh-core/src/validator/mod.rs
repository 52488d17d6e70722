//! Validator identity, selection, weighting, and incentive tracking.

pub mod registry;

pub use registry::ValidatorRegistry;
