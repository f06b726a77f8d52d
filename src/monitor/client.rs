//! Remote event-monitor capability
//!
//! The verifier never talks to a specific RPC framework directly. Everything it
//! needs from the remote monitor is captured by the `ChainMonitor` trait:
//! register an event definition, open a push stream of occurrences, and query
//! recorded occurrences. Transports implement the trait (`HttpChainMonitor`,
//! `InMemoryChainMonitor`).

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use super::types::{EventDefinition, EventOccurrence, EventTypeId, FieldFilter};

// ============================================================================
// ERRORS
// ============================================================================

/// Failure reported by a monitor transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// The monitor could not be reached or the connection broke
    #[error("monitor transport failure: {0}")]
    Transport(String),

    /// The monitor answered with a non-success status
    #[error("monitor rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The monitor's response could not be decoded
    #[error("failed to decode monitor response: {0}")]
    Decode(String),

    /// An incompatible definition is already registered for the same event
    #[error("conflicting registration: {0}")]
    Conflict(String),
}

// ============================================================================
// CAPABILITY TRAIT
// ============================================================================

/// Push stream of occurrences delivered by the monitor.
///
/// The stream ends (`None`) when the monitor closes it; an `Err` item reports a
/// transport or decode failure.
pub type OccurrenceStream = BoxStream<'static, Result<EventOccurrence, MonitorError>>;

/// Capability set of the remote event monitor.
#[async_trait]
pub trait ChainMonitor: Send + Sync {
    /// Registers an event definition and returns the monitor's identifier for it.
    async fn register(&self, definition: &EventDefinition) -> Result<EventTypeId, MonitorError>;

    /// Opens a push stream of occurrences for the given event types.
    async fn stream(&self, event_type_ids: &[EventTypeId]) -> Result<OccurrenceStream, MonitorError>;

    /// Returns recorded occurrences of the given event types matching every filter,
    /// in the monitor's own order.
    async fn query(
        &self,
        event_type_ids: &[EventTypeId],
        filters: &[FieldFilter],
    ) -> Result<Vec<EventOccurrence>, MonitorError>;
}
