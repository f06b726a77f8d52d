//! HTTP Monitor Client Module
//!
//! This module provides a `ChainMonitor` implementation that talks to the remote
//! event monitor over HTTP with JSON bodies:
//!
//! - `POST {url}/v1/events/register` - register an event definition
//! - `POST {url}/v1/events/stream` - long-lived response streaming one JSON
//!   occurrence per line (NDJSON)
//! - `POST {url}/v1/events/historical` - query recorded occurrences

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

use super::client::{ChainMonitor, MonitorError, OccurrenceStream};
use super::types::{EventDefinition, EventOccurrence, EventTypeId, FieldFilter};
use crate::config::MonitorConfig;

// ============================================================================
// WIRE STRUCTURES
// ============================================================================

#[derive(Debug, Deserialize)]
struct RegisterEventResponse {
    event_type_id: EventTypeId,
}

#[derive(Debug, Serialize)]
struct StreamEventsRequest<'a> {
    event_type_ids: &'a [EventTypeId],
}

#[derive(Debug, Serialize)]
struct HistoricalEventsRequest<'a> {
    event_type_ids: &'a [EventTypeId],
    filters: &'a [FieldFilter],
}

#[derive(Debug, Deserialize)]
struct HistoricalEventsResponse {
    occurrences: Vec<EventOccurrence>,
}

// ============================================================================
// HTTP MONITOR IMPLEMENTATION
// ============================================================================

/// Client for the remote event monitor's HTTP API
pub struct HttpChainMonitor {
    /// Client for unary calls, bounded by the configured timeout
    client: Client,
    /// Client for push streams (connect timeout only, the body is long-lived)
    stream_client: Client,
    /// Bound on waiting for the push stream's response headers
    open_timeout: Duration,
    /// Base URL of the monitor without trailing slash
    base_url: String,
}

impl HttpChainMonitor {
    /// Creates a new monitor client from the monitor configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Monitor endpoint and timeout
    ///
    /// # Returns
    ///
    /// * `Ok(HttpChainMonitor)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to create HTTP client
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create monitor HTTP client")?;
        let stream_client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .context("Failed to create monitor stream client")?;

        Ok(Self {
            client,
            stream_client,
            open_timeout: timeout,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Converts a non-success response into `MonitorError::Rejected`.
async fn reject(response: reqwest::Response) -> MonitorError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    MonitorError::Rejected { status, message }
}

fn transport(e: reqwest::Error) -> MonitorError {
    MonitorError::Transport(e.to_string())
}

#[async_trait]
impl ChainMonitor for HttpChainMonitor {
    async fn register(&self, definition: &EventDefinition) -> Result<EventTypeId, MonitorError> {
        let response = self
            .client
            .post(self.endpoint("/v1/events/register"))
            .json(definition)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(reject(response).await);
        }

        let body: RegisterEventResponse = response
            .json()
            .await
            .map_err(|e| MonitorError::Decode(e.to_string()))?;
        Ok(body.event_type_id)
    }

    async fn stream(&self, event_type_ids: &[EventTypeId]) -> Result<OccurrenceStream, MonitorError> {
        let request = self
            .stream_client
            .post(self.endpoint("/v1/events/stream"))
            .json(&StreamEventsRequest { event_type_ids })
            .send();
        let response = tokio::time::timeout(self.open_timeout, request)
            .await
            .map_err(|_| {
                MonitorError::Transport(format!(
                    "no stream response from monitor within {}ms",
                    self.open_timeout.as_millis()
                ))
            })?
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(reject(response).await);
        }

        debug!("Monitor stream opened for {} event type(s)", event_type_ids.len());
        Ok(ndjson_occurrences(response.bytes_stream()))
    }

    async fn query(
        &self,
        event_type_ids: &[EventTypeId],
        filters: &[FieldFilter],
    ) -> Result<Vec<EventOccurrence>, MonitorError> {
        let response = self
            .client
            .post(self.endpoint("/v1/events/historical"))
            .json(&HistoricalEventsRequest {
                event_type_ids,
                filters,
            })
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(reject(response).await);
        }

        let body: HistoricalEventsResponse = response
            .json()
            .await
            .map_err(|e| MonitorError::Decode(e.to_string()))?;
        Ok(body.occurrences)
    }
}

// ============================================================================
// NDJSON DECODING
// ============================================================================

fn parse_line(line: &[u8]) -> Result<EventOccurrence, MonitorError> {
    serde_json::from_slice(line).map_err(|e| MonitorError::Decode(e.to_string()))
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &line[start..end]
}

/// Longest NDJSON line accepted from the monitor.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Turns a chunked byte stream of newline-delimited JSON into an occurrence stream.
///
/// Chunk boundaries may fall anywhere, including inside a line. Blank lines are
/// skipped (monitors may send them as keep-alives). A transport error ends the
/// stream after being reported once; a trailing line without newline is still
/// decoded. A line longer than `MAX_LINE_BYTES` is reported as a decode error
/// and ends the stream.
pub fn ndjson_occurrences<S, B, E>(bytes: S) -> OccurrenceStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    ndjson_occurrences_with_limit(bytes, MAX_LINE_BYTES)
}

/// `ndjson_occurrences` with an explicit line length limit.
pub fn ndjson_occurrences_with_limit<S, B, E>(bytes: S, max_line: usize) -> OccurrenceStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    // (bytes, buffer, bytes of buffer already known to hold no newline, finished)
    let state = (Box::pin(bytes), Vec::<u8>::new(), 0usize, false);
    futures::stream::unfold(state, move |(mut bytes, mut buffer, mut scanned, finished)| async move {
        if finished {
            return None;
        }
        loop {
            if let Some(offset) = buffer[scanned..].iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=scanned + offset).collect();
                scanned = 0;
                if line.len() > max_line + 1 {
                    let item = Err(MonitorError::Decode(format!(
                        "stream line exceeds {} bytes",
                        max_line
                    )));
                    return Some((item, (bytes, buffer, 0, true)));
                }
                let line = trim_line(&line);
                if line.is_empty() {
                    continue;
                }
                let item = parse_line(line);
                return Some((item, (bytes, buffer, scanned, false)));
            }
            scanned = buffer.len();

            if buffer.len() > max_line {
                let item = Err(MonitorError::Decode(format!(
                    "stream line exceeds {} bytes without a newline",
                    max_line
                )));
                buffer.clear();
                return Some((item, (bytes, buffer, 0, true)));
            }

            match bytes.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    let item = Err(MonitorError::Transport(e.to_string()));
                    return Some((item, (bytes, buffer, scanned, true)));
                }
                None => {
                    let rest = std::mem::take(&mut buffer);
                    let rest = trim_line(&rest);
                    if rest.is_empty() {
                        return None;
                    }
                    let item = parse_line(rest);
                    return Some((item, (bytes, buffer, 0, true)));
                }
            }
        }
    })
    .boxed()
}
