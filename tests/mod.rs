//! Test module organization
//!
//! This module re-exports test helpers for use in test files.

mod helpers;

#[allow(unused_imports)]
pub use helpers::{
    bridge_occurrence, build_test_config, build_test_orchestrator, open_test_source,
    register_test_event, signer_response, wait_for_received, DUMMY_CONTRACT, TEST_CHAIN_A,
    TEST_CHAIN_B, TEST_DST,
};
