//! Push-stream consumption into bounded per-chain buffers
//!
//! `EventStreamConsumer::open` subscribes to the monitor's push stream for one
//! event type and spawns a forwarding task that republishes every occurrence
//! into a bounded buffer. The forwarding task never waits on the buffer: when
//! it is full the newest occurrence is dropped, counted and logged. Callers
//! read the buffer through the returned `OccurrenceSource`.

use futures::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::monitor::{ChainId, ChainMonitor, EventOccurrence, EventTypeId, MonitorError, OccurrenceStream};

// ============================================================================
// ERRORS AND TERMINATION
// ============================================================================

/// Failure to open a push stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("monitor stream call failed for chain {chain_id} (event type {event_type_id}): {source}")]
    Open {
        chain_id: ChainId,
        event_type_id: EventTypeId,
        #[source]
        source: MonitorError,
    },

    #[error("opening stream for chain {chain_id} (event type {event_type_id}) cancelled by shutdown")]
    Cancelled {
        chain_id: ChainId,
        event_type_id: EventTypeId,
    },
}

/// Why a forwarding task stopped. The buffer is closed in every case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum StreamEnd {
    /// The monitor ended the stream, or every reader went away
    Closed,
    /// The stream reported a transport or decode failure (not retried)
    Error(String),
    /// Shutdown was requested
    Cancelled,
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Counters shared between a forwarding task and its source handle.
#[derive(Debug, Default)]
pub struct StreamStats {
    received: AtomicU64,
    buffered: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    end: Mutex<Option<StreamEnd>>,
}

impl StreamStats {
    /// Occurrences delivered by the monitor stream
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }

    /// Occurrences admitted to the buffer
    pub fn buffered(&self) -> u64 {
        self.buffered.load(Ordering::Acquire)
    }

    /// Occurrences read out of the buffer
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Occurrences dropped because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Termination reason, once the forwarding task has stopped
    pub fn end(&self) -> Option<StreamEnd> {
        self.end.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn finish(&self, end: StreamEnd) {
        *self.end.lock().unwrap_or_else(|p| p.into_inner()) = Some(end);
    }
}

/// Point-in-time view of one source, as reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    pub chain_id: ChainId,
    pub event_type_id: EventTypeId,
    pub capacity: usize,
    pub received: u64,
    pub buffered: u64,
    pub delivered: u64,
    pub dropped: u64,
    /// `None` while the stream is still running
    pub end: Option<StreamEnd>,
}

// ============================================================================
// CONSUMER
// ============================================================================

/// Opens monitor push streams and backs each with a bounded local buffer.
#[derive(Clone)]
pub struct EventStreamConsumer {
    monitor: Arc<dyn ChainMonitor>,
    capacity: usize,
    cancel: CancellationToken,
}

impl EventStreamConsumer {
    /// Creates a consumer whose buffers hold `capacity` occurrences (at least one).
    ///
    /// Every source opened by this consumer stops when `cancel` is cancelled.
    pub fn new(monitor: Arc<dyn ChainMonitor>, capacity: usize, cancel: CancellationToken) -> Self {
        Self {
            monitor,
            capacity: capacity.max(1),
            cancel,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Opens the push stream of `event_type_id` and starts its forwarding task.
    ///
    /// # Arguments
    ///
    /// * `chain_id` - Chain the event type belongs to (buffer scope and log context)
    /// * `event_type_id` - Identifier returned by registration
    ///
    /// # Returns
    ///
    /// * `Ok(OccurrenceSource)` - Handle over the new buffer
    /// * `Err(StreamError)` - The monitor refused or could not open the stream, or
    ///   shutdown was requested first
    pub async fn open(
        &self,
        chain_id: ChainId,
        event_type_id: EventTypeId,
    ) -> Result<OccurrenceSource, StreamError> {
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(StreamError::Cancelled {
                    chain_id,
                    event_type_id: event_type_id.clone(),
                });
            }
            opened = self.monitor.stream(std::slice::from_ref(&event_type_id)) => opened,
        };
        let stream = opened.map_err(|source| StreamError::Open {
            chain_id,
            event_type_id: event_type_id.clone(),
            source,
        })?;

        let (sender, receiver) = mpsc::channel(self.capacity);
        let stats = Arc::new(StreamStats::default());
        let cancel = self.cancel.child_token();

        let task = tokio::spawn(forward(
            chain_id,
            stream,
            sender,
            self.capacity,
            Arc::clone(&stats),
            cancel.clone(),
        ));

        info!(
            chain_id,
            event_type_id = %event_type_id,
            capacity = self.capacity,
            "Opened event stream"
        );

        Ok(OccurrenceSource {
            chain_id,
            event_type_id,
            capacity: self.capacity,
            receiver: tokio::sync::Mutex::new(receiver),
            stats,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }
}

/// Forwarding task: moves occurrences from the monitor stream into the buffer.
async fn forward(
    chain_id: ChainId,
    mut stream: OccurrenceStream,
    sender: mpsc::Sender<EventOccurrence>,
    capacity: usize,
    stats: Arc<StreamStats>,
    cancel: CancellationToken,
) -> StreamEnd {
    let end = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            item = stream.next() => match item {
                Some(Ok(occurrence)) => {
                    stats.received.fetch_add(1, Ordering::AcqRel);
                    match sender.try_send(occurrence) {
                        Ok(()) => {
                            stats.buffered.fetch_add(1, Ordering::AcqRel);
                        }
                        Err(TrySendError::Full(dropped)) => {
                            let count = stats.dropped.fetch_add(1, Ordering::AcqRel) + 1;
                            warn!(
                                chain_id,
                                dropped = count,
                                capacity,
                                block_number = dropped.block.block_number,
                                "Event buffer full, dropping newest occurrence"
                            );
                        }
                        Err(TrySendError::Closed(_)) => break StreamEnd::Closed,
                    }
                }
                Some(Err(e)) => break StreamEnd::Error(e.to_string()),
                None => break StreamEnd::Closed,
            }
        }
    };

    match &end {
        StreamEnd::Error(reason) => error!(chain_id, "Event stream failed: {}", reason),
        StreamEnd::Closed => info!(chain_id, "Event stream closed"),
        StreamEnd::Cancelled => info!(chain_id, "Event stream cancelled"),
    }
    stats.finish(end.clone());
    end
}

// ============================================================================
// SOURCE HANDLE
// ============================================================================

/// Handle over one per-chain buffer and the task feeding it.
///
/// Reads preserve the order in which the monitor delivered occurrences.
/// Dropping the handle cancels the forwarding task.
pub struct OccurrenceSource {
    chain_id: ChainId,
    event_type_id: EventTypeId,
    capacity: usize,
    receiver: tokio::sync::Mutex<mpsc::Receiver<EventOccurrence>>,
    stats: Arc<StreamStats>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<StreamEnd>>>,
}

impl OccurrenceSource {
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn event_type_id(&self) -> &EventTypeId {
        &self.event_type_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Removes the oldest buffered occurrence without waiting.
    ///
    /// Returns `None` when the buffer is empty, closed and drained, or
    /// currently held by an async reader.
    pub fn try_next(&self) -> Option<EventOccurrence> {
        let mut receiver = self.receiver.try_lock().ok()?;
        let occurrence = receiver.try_recv().ok()?;
        self.stats.delivered.fetch_add(1, Ordering::AcqRel);
        Some(occurrence)
    }

    /// Waits for the next occurrence. Returns `None` once the stream has
    /// ended and the buffer is drained.
    pub async fn next(&self) -> Option<EventOccurrence> {
        let occurrence = self.receiver.lock().await.recv().await?;
        self.stats.delivered.fetch_add(1, Ordering::AcqRel);
        Some(occurrence)
    }

    /// Whether the forwarding task has stopped (buffered items may remain).
    pub fn is_finished(&self) -> bool {
        self.stats.end().is_some()
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            chain_id: self.chain_id,
            event_type_id: self.event_type_id.clone(),
            capacity: self.capacity,
            received: self.stats.received(),
            buffered: self.stats.buffered(),
            delivered: self.stats.delivered(),
            dropped: self.stats.dropped(),
            end: self.stats.end(),
        }
    }

    /// Requests the forwarding task to stop.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Waits for the forwarding task and returns why it stopped.
    ///
    /// Only the first call waits on the task; later calls report the recorded end.
    pub async fn join(&self) -> StreamEnd {
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        match task {
            Some(task) => match task.await {
                Ok(end) => end,
                Err(e) => {
                    let end = StreamEnd::Error(format!("forwarding task aborted: {}", e));
                    self.stats.finish(end.clone());
                    end
                }
            },
            None => {
                debug!(chain_id = self.chain_id, "Forwarding task already joined");
                self.stats.end().unwrap_or(StreamEnd::Cancelled)
            }
        }
    }
}

impl Drop for OccurrenceSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
