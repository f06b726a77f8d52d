//! Source registry
//!
//! Owns the fixed set of per-chain `OccurrenceSource`s built once at startup.
//! The registry is handed to every component that reads buffers instead of
//! living in a global; the set of chains never changes after `start`.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::consumer::{EventStreamConsumer, OccurrenceSource, StreamError, StreamStatus};
use super::registrar::{EventStreamRegistrar, RegistrationError};
use crate::config::MonitorConfig;
use crate::monitor::{ChainId, ChainMonitor, EventDefinition};

/// Startup failure of the source registry.
#[derive(Debug, Error)]
pub enum SourceRegistryError {
    #[error("invalid monitor configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Per-chain sources keyed by chain id.
pub struct SourceRegistry {
    sources: BTreeMap<ChainId, OccurrenceSource>,
    cancel: CancellationToken,
}

impl SourceRegistry {
    /// Registers the bridge event and opens one source per configured chain.
    ///
    /// Any registration or stream failure aborts startup; sources opened before
    /// the failure are torn down.
    ///
    /// # Arguments
    ///
    /// * `config` - Chains, contract, event name, finality and buffer capacity
    /// * `monitor` - Remote monitor transport
    /// * `shutdown` - Process-wide shutdown token
    ///
    /// # Returns
    ///
    /// * `Ok(SourceRegistry)` - Every chain registered and streaming
    /// * `Err(SourceRegistryError)` - Startup failed for at least one chain
    pub async fn start(
        config: &MonitorConfig,
        monitor: Arc<dyn ChainMonitor>,
        shutdown: CancellationToken,
    ) -> Result<Self, SourceRegistryError> {
        let address = config
            .contract_address_bytes()
            .map_err(|e| SourceRegistryError::InvalidConfig(e.to_string()))?;

        let cancel = shutdown.child_token();
        let registrar = EventStreamRegistrar::new(Arc::clone(&monitor));
        let consumer = EventStreamConsumer::new(monitor, config.buffer_capacity, cancel.clone());

        let mut sources = BTreeMap::new();
        for &chain_id in &config.chain_ids {
            let mut definition =
                EventDefinition::bridge_receipt(chain_id, address.clone(), config.finality);
            definition.event_name = config.event_name.clone();

            let event_type_id = registrar.register_definition(&definition).await?;
            let source = consumer.open(chain_id, event_type_id).await?;
            sources.insert(chain_id, source);
        }

        info!("Monitoring {} chain(s): {:?}", sources.len(), config.chain_ids);
        Ok(Self { sources, cancel })
    }

    /// Builds a registry from sources opened elsewhere.
    ///
    /// `cancel` should be the token the sources' consumer was created with so
    /// `shutdown` reaches their forwarding tasks.
    pub fn from_sources(
        sources: impl IntoIterator<Item = OccurrenceSource>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.chain_id(), s)).collect(),
            cancel,
        }
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&OccurrenceSource> {
        self.sources.get(&chain_id)
    }

    /// Monitored chains in ascending order.
    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.sources.keys().copied().collect()
    }

    pub fn sources(&self) -> impl Iterator<Item = &OccurrenceSource> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Status of every source, ordered by chain id.
    pub fn statuses(&self) -> Vec<StreamStatus> {
        self.sources.values().map(OccurrenceSource::status).collect()
    }

    /// Cancels every source and waits for the forwarding tasks to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        for source in self.sources.values() {
            let end = source.join().await;
            info!(chain_id = source.chain_id(), "Stream stopped: {:?}", end);
        }
    }
}
