//! Test module for touchfish-core
//!
//! Covers recipe discovery, navigation, execution (supersession, timeouts,
//! malformed output), action dispatch, the session loop, and configuration.
//! Execution tests run real `/bin/sh` recipes from temporary bundles.

mod dispatch_tests;
mod engine_tests;
