//! Shared test helpers for integration tests
//!
//! The module is organized into several categories:
//! - **Configuration Builders**: test configurations pointing at mock servers
//! - **Event Creators**: bridge occurrences shaped like the monitor reports them
//! - **Stream Helpers**: registering, opening and waiting on in-memory streams
//! - **Signer Helpers**: signer response bodies

#![allow(dead_code)]

use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use std::time::Duration;
use swap_verifier::config::Config;
use swap_verifier::lookup::HistoricalEventLookup;
use swap_verifier::monitor::{
    BlockInfo, ChainId, EventDefinition, EventFieldValue, EventOccurrence, EventTypeId,
    FinalityPolicy, InMemoryChainMonitor,
};
use swap_verifier::signer::SignerClient;
use swap_verifier::stream::{EventStreamConsumer, EventStreamRegistrar, OccurrenceSource};
use swap_verifier::validator::{ObservedSwapPredicate, ValidationOrchestrator};
use tokio_util::sync::CancellationToken;

// ============================================================================
// CONSTANTS
// ============================================================================

/// First monitored test chain
pub const TEST_CHAIN_A: ChainId = 1337;

/// Second monitored test chain
pub const TEST_CHAIN_B: ChainId = 1338;

/// Dummy bridge contract address (EVM format, 20 bytes)
pub const DUMMY_CONTRACT: &str = "0x20eef038c83b7a0f357d4abc64b8f639427d7af6";

/// Domain-separation tag the test signer answers with
pub const TEST_DST: &str = "dsigner-v01-BN254G1_XMD:KECCAK-256_SVDW_RO_";

// ============================================================================
// CONFIGURATION BUILDERS
// ============================================================================

/// Build a validated test configuration whose monitor and signer point at the given URLs
pub fn build_test_config(monitor_url: &str, signer_url: &str) -> Config {
    let mut config = Config::default();
    config.api.host = "127.0.0.1".to_string();
    config.api.port = 0;
    config.monitor.url = monitor_url.to_string();
    config.monitor.timeout_ms = 2_000;
    config.monitor.chain_ids = vec![TEST_CHAIN_A, TEST_CHAIN_B];
    config.monitor.contract_address = DUMMY_CONTRACT.to_string();
    config.monitor.buffer_capacity = 4;
    config.signer.host = signer_url.to_string();
    config.signer.timeout_ms = 2_000;
    config.signer.accepted_dst = TEST_DST.to_string();
    config.validate().expect("test config should be valid");
    config
}

// ============================================================================
// EVENT CREATORS
// ============================================================================

/// Create a BridgeReceipt occurrence carrying `swap_id` in the correlation field (index 1)
pub fn bridge_occurrence(
    event_type_id: &EventTypeId,
    chain_id: ChainId,
    swap_id: &[u8],
    block_number: u64,
) -> EventOccurrence {
    let field = |sol_type: &str, indexed: bool, value: Vec<u8>| EventFieldValue {
        sol_type: sol_type.to_string(),
        indexed,
        value,
    };
    EventOccurrence {
        event_type_id: event_type_id.clone(),
        chain_id,
        address: hex::decode(&DUMMY_CONTRACT[2..]).expect("valid contract hex"),
        data: vec![
            field("bytes32", true, vec![0x11; 32]),
            field("uint256", true, swap_id.to_vec()),
            field("address", true, vec![0x22; 20]),
            field("uint256", false, vec![0x01]),
        ],
        block: BlockInfo {
            block_number,
            block_hash: vec![0x33; 32],
            transaction_hash: vec![0x44; 32],
            log_index: 0,
            timestamp: 1_700_000_000 + block_number,
        },
    }
}

// ============================================================================
// STREAM HELPERS
// ============================================================================

/// Register the BridgeReceipt event on `chain_id` with the in-memory monitor
pub async fn register_test_event(monitor: &Arc<InMemoryChainMonitor>, chain_id: ChainId) -> EventTypeId {
    let registrar = EventStreamRegistrar::new(monitor.clone());
    let definition = EventDefinition::bridge_receipt(
        chain_id,
        hex::decode(&DUMMY_CONTRACT[2..]).expect("valid contract hex"),
        FinalityPolicy::Latest,
    );
    registrar
        .register_definition(&definition)
        .await
        .expect("registration should succeed")
}

/// Register and open one source on `chain_id` with the given buffer capacity
pub async fn open_test_source(
    monitor: &Arc<InMemoryChainMonitor>,
    chain_id: ChainId,
    capacity: usize,
    cancel: &CancellationToken,
) -> (EventTypeId, OccurrenceSource) {
    let event_type_id = register_test_event(monitor, chain_id).await;
    let consumer = EventStreamConsumer::new(monitor.clone(), capacity, cancel.clone());
    let source = consumer
        .open(chain_id, event_type_id.clone())
        .await
        .expect("stream should open");
    (event_type_id, source)
}

/// Wait until the forwarding task of `source` has received `count` occurrences
pub async fn wait_for_received(source: &OccurrenceSource, count: u64) {
    for _ in 0..200 {
        if source.stats().received() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "source for chain {} received {} occurrences, expected {}",
        source.chain_id(),
        source.stats().received(),
        count
    );
}

// ============================================================================
// SIGNER HELPERS
// ============================================================================

/// Build a signer `/sign` response body
pub fn signer_response(signature: &[u8], dst: &str) -> serde_json::Value {
    serde_json::json!({
        "signature": general_purpose::STANDARD.encode(signature),
        "dst": dst,
    })
}

/// Build an orchestrator over `monitor` that signs with the signer at `signer_url`
pub fn build_test_orchestrator(
    monitor: Arc<InMemoryChainMonitor>,
    signer_url: &str,
    strict_chain_check: bool,
    cancel: CancellationToken,
) -> ValidationOrchestrator {
    let config = build_test_config("http://127.0.0.1:9", signer_url);
    ValidationOrchestrator::new(
        HistoricalEventLookup::new(monitor),
        SignerClient::new(&config.signer).expect("signer client"),
        Arc::new(ObservedSwapPredicate::new(
            config.monitor.chain_ids.clone(),
            strict_chain_check,
        )),
        config.monitor.correlation_field_index,
        cancel,
    )
}
