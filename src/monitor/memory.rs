//! In-process event monitor
//!
//! `InMemoryChainMonitor` implements the full `ChainMonitor` capability without a
//! network: registrations get deterministic UUID v5 identifiers, published
//! occurrences are pushed to every open stream and recorded for historical
//! queries. It backs local runs and the test-suite fixtures, and lets callers
//! inject transport failures and stream terminations.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::client::{ChainMonitor, MonitorError, OccurrenceStream};
use super::types::{ChainId, EventDefinition, EventOccurrence, EventTypeId, FieldFilter};

type RegistrationKey = (ChainId, Vec<u8>, String);
type Subscriber = (Vec<EventTypeId>, mpsc::UnboundedSender<Result<EventOccurrence, MonitorError>>);

#[derive(Default)]
struct MonitorState {
    registrations: HashMap<RegistrationKey, (EventDefinition, EventTypeId)>,
    history: Vec<EventOccurrence>,
    subscribers: Vec<Subscriber>,
    unavailable: Option<String>,
}

/// Event monitor that keeps registrations and occurrences in memory
#[derive(Default)]
pub struct InMemoryChainMonitor {
    state: Mutex<MonitorState>,
}

impl InMemoryChainMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        // A panicking test thread must not wedge every other caller.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Derives the identifier the monitor assigns to a definition.
    ///
    /// Identical definitions always map to the same id.
    pub fn event_type_id_for(definition: &EventDefinition) -> EventTypeId {
        let canonical = serde_json::to_vec(definition).unwrap_or_default();
        Uuid::new_v5(&Uuid::NAMESPACE_OID, &canonical).into()
    }

    /// Records an occurrence for historical queries and pushes it to every
    /// open stream subscribed to its event type.
    pub fn publish(&self, occurrence: EventOccurrence) {
        let mut state = self.state();
        state.subscribers.retain(|(ids, sender)| {
            if !ids.contains(&occurrence.event_type_id) {
                return !sender.is_closed();
            }
            sender.send(Ok(occurrence.clone())).is_ok()
        });
        state.history.push(occurrence);
    }

    /// Records an occurrence for historical queries only.
    pub fn record(&self, occurrence: EventOccurrence) {
        self.state().history.push(occurrence);
    }

    /// Delivers a stream error to every open stream.
    pub fn fail_streams(&self, message: &str) {
        let mut state = self.state();
        for (_, sender) in state.subscribers.drain(..) {
            let _ = sender.send(Err(MonitorError::Transport(message.to_string())));
        }
    }

    /// Ends every open stream cleanly.
    pub fn close_streams(&self) {
        self.state().subscribers.clear();
    }

    /// Makes every subsequent call fail with a transport error, or restores
    /// normal operation with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.state().unavailable = reason.map(str::to_string);
    }

    /// Number of streams currently open.
    pub fn open_streams(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|(_, sender)| !sender.is_closed());
        state.subscribers.len()
    }

    fn check_available(state: &MonitorState) -> Result<(), MonitorError> {
        match &state.unavailable {
            Some(reason) => Err(MonitorError::Transport(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainMonitor for InMemoryChainMonitor {
    async fn register(&self, definition: &EventDefinition) -> Result<EventTypeId, MonitorError> {
        let mut state = self.state();
        Self::check_available(&state)?;

        let key = (
            definition.chain_id,
            definition.address.clone(),
            definition.event_name.clone(),
        );
        if let Some((existing, id)) = state.registrations.get(&key) {
            if existing == definition {
                return Ok(id.clone());
            }
            return Err(MonitorError::Conflict(format!(
                "{} on chain {} is already registered with a different schema or finality",
                definition.event_name, definition.chain_id
            )));
        }

        let id = Self::event_type_id_for(definition);
        debug!(
            chain_id = definition.chain_id,
            event_type_id = %id,
            "Registered {}",
            definition.signature()
        );
        state.registrations.insert(key, (definition.clone(), id.clone()));
        Ok(id)
    }

    async fn stream(&self, event_type_ids: &[EventTypeId]) -> Result<OccurrenceStream, MonitorError> {
        let mut state = self.state();
        Self::check_available(&state)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscribers.push((event_type_ids.to_vec(), sender));

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        });
        Ok(stream.boxed())
    }

    async fn query(
        &self,
        event_type_ids: &[EventTypeId],
        filters: &[FieldFilter],
    ) -> Result<Vec<EventOccurrence>, MonitorError> {
        let state = self.state();
        Self::check_available(&state)?;

        Ok(state
            .history
            .iter()
            .filter(|o| event_type_ids.contains(&o.event_type_id))
            .filter(|o| filters.iter().all(|f| o.matches(f)))
            .cloned()
            .collect())
    }
}
