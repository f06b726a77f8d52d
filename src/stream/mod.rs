//! Event Streaming Module
//!
//! Registration of event definitions, consumption of the monitor's push
//! streams into bounded per-chain buffers, and the registry owning those
//! buffers for the lifetime of the process.

pub mod consumer;
pub mod registrar;
pub mod registry;

pub use consumer::{
    EventStreamConsumer, OccurrenceSource, StreamEnd, StreamError, StreamStats, StreamStatus,
};
pub use registrar::{EventStreamRegistrar, RegistrationError};
pub use registry::{SourceRegistry, SourceRegistryError};
