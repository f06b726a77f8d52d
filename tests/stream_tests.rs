//! Tests for stream consumption, the source registry and the aggregator
//!
//! Streams run against the in-memory monitor so delivery, drops and
//! termination can be driven deterministically.

use std::sync::Arc;
use std::time::Duration;
use swap_verifier::aggregator::MultiChainAggregator;
use swap_verifier::monitor::InMemoryChainMonitor;
use swap_verifier::stream::{
    EventStreamConsumer, RegistrationError, SourceRegistry, SourceRegistryError, StreamEnd,
    StreamError,
};
use tokio_util::sync::CancellationToken;

#[path = "mod.rs"]
mod test_helpers;

use test_helpers::{
    bridge_occurrence, build_test_config, open_test_source, register_test_event,
    wait_for_received, TEST_CHAIN_A, TEST_CHAIN_B,
};

// ============================================================================
// BUFFERING AND DROP POLICY
// ============================================================================

/// Test that a full buffer keeps the oldest occurrences and drops the newest
/// What is tested: 5 occurrences into a 3-slot buffer, then drain
/// Why: Exactly min(N, capacity) occurrences must be drained, in delivery order
#[tokio::test]
async fn test_buffer_drops_newest_when_full() {
    let _ = tracing_subscriber::fmt::try_init();
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let cancel = CancellationToken::new();
    let (event_type_id, source) = open_test_source(&monitor, TEST_CHAIN_A, 3, &cancel).await;

    for block in 0..5u64 {
        monitor.publish(bridge_occurrence(&event_type_id, TEST_CHAIN_A, &[block as u8], block));
    }
    monitor.close_streams();
    assert_eq!(source.join().await, StreamEnd::Closed);

    let status = source.status();
    assert_eq!(status.received, 5);
    assert_eq!(status.buffered, 3);
    assert_eq!(status.dropped, 2);
    assert_eq!(status.end, Some(StreamEnd::Closed));

    let registry = Arc::new(SourceRegistry::from_sources(vec![source], cancel));
    let aggregator = MultiChainAggregator::new(registry.clone());

    let mut blocks = Vec::new();
    for _ in 0..5 {
        for occurrence in aggregator.drain_available() {
            blocks.push(occurrence.block.block_number);
        }
    }
    assert_eq!(blocks, vec![0, 1, 2]);
    assert_eq!(registry.statuses()[0].delivered, 3);
}

/// Test that nothing is dropped while the buffer has room
/// What is tested: occurrences below capacity arrive intact and ordered
/// Why: Drops may only happen beyond capacity
#[tokio::test]
async fn test_buffer_below_capacity_keeps_everything() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let cancel = CancellationToken::new();
    let (event_type_id, source) = open_test_source(&monitor, TEST_CHAIN_A, 8, &cancel).await;

    for block in 10..14u64 {
        monitor.publish(bridge_occurrence(&event_type_id, TEST_CHAIN_A, &[0xaa], block));
    }
    wait_for_received(&source, 4).await;

    let mut blocks = Vec::new();
    while let Some(occurrence) = source.try_next() {
        blocks.push(occurrence.block.block_number);
    }
    assert_eq!(blocks, vec![10, 11, 12, 13]);
    assert_eq!(source.stats().dropped(), 0);
}

/// Test that a zero capacity is raised to one slot
/// Why: A bounded channel cannot have zero capacity
#[tokio::test]
async fn test_zero_capacity_is_clamped() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let consumer = EventStreamConsumer::new(monitor, 0, CancellationToken::new());
    assert_eq!(consumer.capacity(), 1);
}

/// Test that occurrences of other event types never reach a source
/// What is tested: publish on chain B while only chain A is open
/// Why: A stream is filtered by its event type id
#[tokio::test]
async fn test_stream_is_filtered_by_event_type() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let cancel = CancellationToken::new();
    let (_, source) = open_test_source(&monitor, TEST_CHAIN_A, 4, &cancel).await;
    let other_id = register_test_event(&monitor, TEST_CHAIN_B).await;

    monitor.publish(bridge_occurrence(&other_id, TEST_CHAIN_B, &[0x01], 1));
    monitor.close_streams();
    source.join().await;

    assert_eq!(source.stats().received(), 0);
    assert!(source.try_next().is_none());
}

// ============================================================================
// TERMINATION
// ============================================================================

/// Test that a stream error ends the forwarding task with the error recorded
/// What is tested: injected transport failure on the monitor stream
/// Why: Errors are logged and not retried; the buffer is closed
#[tokio::test]
async fn test_stream_error_terminates_source() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let cancel = CancellationToken::new();
    let (event_type_id, source) = open_test_source(&monitor, TEST_CHAIN_A, 4, &cancel).await;

    monitor.publish(bridge_occurrence(&event_type_id, TEST_CHAIN_A, &[0x01], 1));
    monitor.fail_streams("connection reset");

    match source.join().await {
        StreamEnd::Error(reason) => assert!(reason.contains("connection reset")),
        other => panic!("expected stream error, got {:?}", other),
    }
    assert!(source.is_finished());

    // What was buffered before the failure is still readable, then the buffer is closed
    assert_eq!(source.try_next().map(|o| o.block.block_number), Some(1));
    assert!(source.next().await.is_none());
    assert_eq!(monitor.open_streams(), 0);
}

/// Test that cancellation stops the forwarding task promptly
/// What is tested: cancelling the consumer's token while the stream is idle
/// Why: Shutdown must never wait for the monitor to send something
#[tokio::test]
async fn test_cancel_stops_forwarding_task() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let cancel = CancellationToken::new();
    let (_, source) = open_test_source(&monitor, TEST_CHAIN_A, 4, &cancel).await;

    cancel.cancel();
    let end = tokio::time::timeout(Duration::from_secs(2), source.join())
        .await
        .expect("forwarding task should stop promptly");

    assert_eq!(end, StreamEnd::Cancelled);
    assert_eq!(source.status().end, Some(StreamEnd::Cancelled));
    assert_eq!(monitor.open_streams(), 0);
}

/// Test that closing one source leaves the others running
/// Why: Every source owns its own cancellation
#[tokio::test]
async fn test_close_single_source() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let cancel = CancellationToken::new();
    let (_, source_a) = open_test_source(&monitor, TEST_CHAIN_A, 4, &cancel).await;
    let (id_b, source_b) = open_test_source(&monitor, TEST_CHAIN_B, 4, &cancel).await;

    source_a.close();
    assert_eq!(source_a.join().await, StreamEnd::Cancelled);

    monitor.publish(bridge_occurrence(&id_b, TEST_CHAIN_B, &[0x02], 5));
    wait_for_received(&source_b, 1).await;
    assert!(!source_b.is_finished());
}

/// Test that opening a stream on an unavailable monitor fails
/// What is tested: open() while the monitor rejects every call
/// Why: Open failures must surface with chain context
#[tokio::test]
async fn test_open_failure() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let event_type_id = register_test_event(&monitor, TEST_CHAIN_A).await;
    monitor.set_unavailable(Some("monitor down"));

    let consumer = EventStreamConsumer::new(monitor.clone(), 4, CancellationToken::new());
    let result = consumer.open(TEST_CHAIN_A, event_type_id).await;

    match result {
        Err(StreamError::Open { chain_id, .. }) => assert_eq!(chain_id, TEST_CHAIN_A),
        Err(other) => panic!("expected open failure, got {:?}", other),
        Ok(_) => panic!("open should fail"),
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Test that draining with nothing buffered returns an empty result immediately
/// What is tested: drain_available() on idle sources
/// Why: "No data yet" is not a failure and must not block
#[tokio::test]
async fn test_drain_empty_returns_immediately() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let cancel = CancellationToken::new();
    let (_, source_a) = open_test_source(&monitor, TEST_CHAIN_A, 4, &cancel).await;
    let (_, source_b) = open_test_source(&monitor, TEST_CHAIN_B, 4, &cancel).await;
    let registry = Arc::new(SourceRegistry::from_sources(vec![source_a, source_b], cancel));
    let aggregator = MultiChainAggregator::new(registry);

    let drained = tokio::time::timeout(Duration::from_millis(100), async {
        aggregator.drain_available()
    })
    .await
    .expect("drain must not block");

    assert!(drained.is_empty());
}

/// Test that one sweep takes at most one occurrence per chain
/// What is tested: two chains with several pending occurrences each
/// Why: A sweep never revisits a chain within one call
#[tokio::test]
async fn test_drain_takes_one_per_chain() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let cancel = CancellationToken::new();
    let (id_a, source_a) = open_test_source(&monitor, TEST_CHAIN_A, 4, &cancel).await;
    let (id_b, source_b) = open_test_source(&monitor, TEST_CHAIN_B, 4, &cancel).await;

    for block in 1..=3u64 {
        monitor.publish(bridge_occurrence(&id_a, TEST_CHAIN_A, &[0x0a], block));
    }
    monitor.publish(bridge_occurrence(&id_b, TEST_CHAIN_B, &[0x0b], 100));
    wait_for_received(&source_a, 3).await;
    wait_for_received(&source_b, 1).await;

    let registry = Arc::new(SourceRegistry::from_sources(vec![source_a, source_b], cancel));
    let aggregator = MultiChainAggregator::new(registry);

    let first = aggregator.drain_available();
    assert_eq!(first.len(), 2);
    let chains: Vec<u64> = first.iter().map(|o| o.chain_id).collect();
    assert!(chains.contains(&TEST_CHAIN_A) && chains.contains(&TEST_CHAIN_B));

    let second = aggregator.drain_available();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].chain_id, TEST_CHAIN_A);
    assert_eq!(second[0].block.block_number, 2);
}

// ============================================================================
// SOURCE REGISTRY
// ============================================================================

/// Test that startup registers and opens one source per configured chain
/// What is tested: SourceRegistry::start with two chains, then shutdown
/// Why: Every configured chain needs its own buffer at startup
#[tokio::test]
async fn test_registry_start_and_shutdown() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    let config = build_test_config("http://127.0.0.1:9", "http://127.0.0.1:9");
    let shutdown = CancellationToken::new();

    let registry = SourceRegistry::start(&config.monitor, monitor.clone(), shutdown.clone())
        .await
        .unwrap();

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.chain_ids(), vec![TEST_CHAIN_A, TEST_CHAIN_B]);
    assert_eq!(monitor.open_streams(), 2);

    let source_b = registry.get(TEST_CHAIN_B).unwrap();
    let id_b = source_b.event_type_id().clone();
    monitor.publish(bridge_occurrence(&id_b, TEST_CHAIN_B, &[0xaa], 42));
    wait_for_received(source_b, 1).await;

    let registry = Arc::new(registry);
    let drained = MultiChainAggregator::new(registry.clone()).drain_available();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].block.block_number, 42);

    registry.shutdown().await;
    for status in registry.statuses() {
        assert_eq!(status.end, Some(StreamEnd::Cancelled));
    }
    assert!(!shutdown.is_cancelled(), "registry shutdown must not cancel its parent");
}

/// Test that a registration failure aborts startup
/// What is tested: SourceRegistry::start against an unavailable monitor
/// Why: Registration errors are fatal at startup
#[tokio::test]
async fn test_registry_start_fails_on_registration_error() {
    let monitor = Arc::new(InMemoryChainMonitor::new());
    monitor.set_unavailable(Some("monitor down"));
    let config = build_test_config("http://127.0.0.1:9", "http://127.0.0.1:9");

    let result = SourceRegistry::start(&config.monitor, monitor.clone(), CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(SourceRegistryError::Registration(RegistrationError::Transport { .. }))
    ));
}
