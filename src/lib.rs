//! Swap Verifier Service Library
//!
//! This crate validates cross-chain swap bridge events and obtains threshold
//! signatures attesting to them. It registers the bridge event with a remote
//! event monitor on every configured chain, buffers the monitor's push streams
//! per chain, and answers validation requests by correlating a swap with its
//! recorded bridge event before asking the threshold signer for a signature.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod lookup;
pub mod monitor;
pub mod signer;
pub mod stream;
pub mod validator;

// Re-export commonly used types
pub use aggregator::MultiChainAggregator;
pub use config::{ApiConfig, Config, MonitorConfig, SignerConfig};
pub use lookup::{HistoricalEventLookup, LookupError};
pub use monitor::{ChainMonitor, EventDefinition, EventOccurrence, EventTypeId, MonitorError};
pub use signer::{SignaturePayload, SignerClient, SigningError};
pub use stream::{EventStreamConsumer, EventStreamRegistrar, OccurrenceSource, SourceRegistry};
pub use validator::{
    ObservedSwapPredicate, ValidationError, ValidationOrchestrator, ValidationOutcome,
    ValidationRequest, ValidationResponse, ValidityPredicate,
};
