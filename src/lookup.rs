//! Historical event lookup by correlation id

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::monitor::{encode_hex, ChainMonitor, EventOccurrence, EventTypeId, FieldFilter, MonitorError};

/// Failure to find a recorded occurrence.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The monitor answered, but nothing matched
    #[error("no occurrence of {event_type_id} with field {field_index} = {value}")]
    NotFound {
        event_type_id: EventTypeId,
        field_index: u32,
        /// Hex-encoded correlation value
        value: String,
    },

    /// Transport or decode failure talking to the monitor
    #[error("monitor {operation} call failed: {source}")]
    Monitor {
        operation: &'static str,
        #[source]
        source: MonitorError,
    },
}

/// Queries the monitor for previously observed occurrences.
#[derive(Clone)]
pub struct HistoricalEventLookup {
    monitor: Arc<dyn ChainMonitor>,
}

impl HistoricalEventLookup {
    pub fn new(monitor: Arc<dyn ChainMonitor>) -> Self {
        Self { monitor }
    }

    /// Finds the occurrence of `event_type_id` whose field at `field_index`
    /// equals `exact_value` byte for byte.
    ///
    /// When several occurrences match, the first one in the monitor's response
    /// order wins. No local re-ranking happens.
    ///
    /// # Arguments
    ///
    /// * `event_type_id` - Scope of the query
    /// * `field_index` - Position of the correlation field in the schema
    /// * `exact_value` - Correlation value to match
    ///
    /// # Returns
    ///
    /// * `Ok(EventOccurrence)` - First matching occurrence, unchanged
    /// * `Err(LookupError::NotFound)` - The monitor returned no match
    /// * `Err(LookupError::Monitor)` - The query itself failed
    pub async fn find_by_correlation_id(
        &self,
        event_type_id: &EventTypeId,
        field_index: u32,
        exact_value: &[u8],
    ) -> Result<EventOccurrence, LookupError> {
        let filter = FieldFilter::exact(field_index, exact_value);
        let occurrences = self
            .monitor
            .query(std::slice::from_ref(event_type_id), std::slice::from_ref(&filter))
            .await
            .map_err(|source| LookupError::Monitor {
                operation: "historical query",
                source,
            })?;

        debug!(
            event_type_id = %event_type_id,
            matches = occurrences.len(),
            "Historical query answered"
        );

        occurrences
            .into_iter()
            .next()
            .ok_or_else(|| LookupError::NotFound {
                event_type_id: event_type_id.clone(),
                field_index,
                value: encode_hex(exact_value),
            })
    }
}
