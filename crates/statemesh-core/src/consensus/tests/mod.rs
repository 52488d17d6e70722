mod quorum_tests;
