//! Property tests over randomly arranged source and target trees.

mod reconcile_tests;
