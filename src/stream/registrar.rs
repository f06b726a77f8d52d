//! Event registration with the remote monitor

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::monitor::{
    ChainId, ChainMonitor, EventDefinition, EventField, EventTypeId, FinalityPolicy, MonitorError,
};

/// Failure to register an event definition. Fatal at startup for that chain.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The definition failed local checks and was never sent
    #[error("invalid event definition for chain {chain_id}: {reason}")]
    InvalidDefinition { chain_id: ChainId, reason: String },

    /// The monitor refused the definition (unknown chain, malformed address, ...)
    #[error("monitor rejected registration for chain {chain_id} (status {status}): {message}")]
    Rejected {
        chain_id: ChainId,
        status: u16,
        message: String,
    },

    /// An incompatible definition is already registered for the same tuple
    #[error("monitor reported a conflicting registration for chain {chain_id}: {message}")]
    Conflict { chain_id: ChainId, message: String },

    /// The monitor could not be reached or answered garbage
    #[error("monitor register call failed for chain {chain_id}: {source}")]
    Transport {
        chain_id: ChainId,
        #[source]
        source: MonitorError,
    },
}

/// Registers event definitions and hands back the monitor's event type ids.
#[derive(Clone)]
pub struct EventStreamRegistrar {
    monitor: Arc<dyn ChainMonitor>,
}

impl EventStreamRegistrar {
    pub fn new(monitor: Arc<dyn ChainMonitor>) -> Self {
        Self { monitor }
    }

    /// Registers an event of `contract_address` on `chain_id`.
    ///
    /// `fields` must be non-empty and ordered like the event ABI. Idempotency
    /// is up to the monitor: re-registering the same tuple returns whatever the
    /// monitor answers (same id, or a conflict).
    ///
    /// # Arguments
    ///
    /// * `chain_id` - Chain to watch
    /// * `contract_address` - Emitting contract
    /// * `event_name` - Event name from the ABI
    /// * `fields` - Ordered field schema
    /// * `finality` - Confirmation depth before reporting
    ///
    /// # Returns
    ///
    /// * `Ok(EventTypeId)` - Identifier assigned by the monitor
    /// * `Err(RegistrationError)` - Definition invalid or rejected
    pub async fn register(
        &self,
        chain_id: ChainId,
        contract_address: Vec<u8>,
        event_name: &str,
        fields: Vec<EventField>,
        finality: FinalityPolicy,
    ) -> Result<EventTypeId, RegistrationError> {
        let definition = EventDefinition {
            chain_id,
            address: contract_address,
            event_name: event_name.to_string(),
            fields,
            finality,
        };
        self.register_definition(&definition).await
    }

    /// Registers a prepared definition.
    pub async fn register_definition(
        &self,
        definition: &EventDefinition,
    ) -> Result<EventTypeId, RegistrationError> {
        let chain_id = definition.chain_id;
        definition
            .validate()
            .map_err(|reason| RegistrationError::InvalidDefinition { chain_id, reason })?;

        match self.monitor.register(definition).await {
            Ok(id) => {
                info!(
                    chain_id,
                    event_type_id = %id,
                    finality = %definition.finality,
                    "Registered {}",
                    definition.signature()
                );
                Ok(id)
            }
            Err(e) => {
                warn!(chain_id, "Registration of {} failed: {}", definition.event_name, e);
                Err(match e {
                    MonitorError::Rejected { status, message } => RegistrationError::Rejected {
                        chain_id,
                        status,
                        message,
                    },
                    MonitorError::Conflict(message) => {
                        RegistrationError::Conflict { chain_id, message }
                    }
                    source => RegistrationError::Transport { chain_id, source },
                })
            }
        }
    }
}
