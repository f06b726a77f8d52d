//! Event Monitor Module
//!
//! Data model and transports for the remote event monitor. The rest of the
//! service only depends on the `ChainMonitor` capability; `HttpChainMonitor`
//! is the production transport and `InMemoryChainMonitor` the in-process one.

pub mod client;
pub mod http;
pub mod memory;
pub mod types;

pub use client::{ChainMonitor, MonitorError, OccurrenceStream};
pub use http::HttpChainMonitor;
pub use memory::InMemoryChainMonitor;
pub use types::{
    decode_hex, encode_hex, BlockInfo, ChainId, EventDefinition, EventField, EventFieldValue, EventOccurrence,
    EventTypeId, FieldFilter, FinalityPolicy,
};
