//! Generic API structures and server
//!
//! This module contains the shared response envelope, filter helpers, the
//! rejection handler and the API server that wires every route together.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use warp::hyper::body::Bytes;
use warp::{http::StatusCode, Filter, Rejection, Reply};

use crate::aggregator::MultiChainAggregator;
use crate::config::Config;
use crate::stream::{SourceRegistry, StreamStatus};
use crate::validator::ValidationOrchestrator;

// ============================================================================
// SHARED REQUEST/RESPONSE STRUCTURES
// ============================================================================

/// Standardized response structure for all API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (if successful)
    pub data: Option<T>,
    /// Error message (if failed)
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Service status reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    /// Unix time the status was taken
    pub timestamp: u64,
    /// One entry per monitored chain
    pub streams: Vec<StreamStatus>,
}

// ============================================================================
// WARP FILTER HELPERS
// ============================================================================

/// Creates a warp filter that provides access to the source registry.
pub fn with_registry(
    registry: Arc<SourceRegistry>,
) -> impl Filter<Extract = (Arc<SourceRegistry>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || registry.clone())
}

/// Creates a warp filter that provides access to the multi-chain aggregator.
pub fn with_aggregator(
    aggregator: MultiChainAggregator,
) -> impl Filter<Extract = (MultiChainAggregator,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || aggregator.clone())
}

/// Creates a warp filter that provides access to the validation orchestrator.
///
/// # Arguments
///
/// * `orchestrator` - The validation orchestrator instance
///
/// # Returns
///
/// A warp filter that provides the orchestrator to handlers
pub fn with_orchestrator(
    orchestrator: Arc<ValidationOrchestrator>,
) -> impl Filter<Extract = (Arc<ValidationOrchestrator>,), Error = std::convert::Infallible> + Clone
{
    warp::any().map(move || orchestrator.clone())
}

// ============================================================================
// CUSTOM REJECTION TYPES
// ============================================================================

/// Custom rejection for JSON deserialization errors
#[derive(Debug)]
pub struct JsonDeserializeError(pub String);

impl warp::reject::Reject for JsonDeserializeError {}

// ============================================================================
// REJECTION HANDLER
// ============================================================================

/// Global rejection handler for all API routes.
///
/// Converts warp rejections into `ApiResponse` errors with matching HTTP
/// status codes.
pub async fn handle_rejection(rej: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (status, message) = if let Some(err) = rej.find::<JsonDeserializeError>() {
        (StatusCode::BAD_REQUEST, err.0.clone())
    } else if rej.is_not_found() {
        (StatusCode::NOT_FOUND, "Endpoint not found".to_string())
    } else if rej.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", rej);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::<()>::err(message)),
        status,
    ))
}

/// Handler for the health endpoint.
pub async fn health_handler(
    registry: Arc<SourceRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(HealthStatus {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().timestamp() as u64,
        streams: registry.statuses(),
    })))
}

// ============================================================================
// API SERVER IMPLEMENTATION
// ============================================================================

/// REST API server for the swap verifier service.
pub struct ApiServer {
    /// Service configuration
    config: Arc<Config>,
    /// Per-chain event sources
    registry: Arc<SourceRegistry>,
    /// Sweeps the per-chain buffers for `/v1/swap/latest`
    aggregator: MultiChainAggregator,
    /// Validates and signs swaps for `/v1/swap/validation`
    orchestrator: Arc<ValidationOrchestrator>,
}

impl ApiServer {
    /// Creates a new API server with the given components.
    ///
    /// # Arguments
    ///
    /// * `config` - Service configuration
    /// * `registry` - Source registry built at startup
    /// * `orchestrator` - Validation orchestrator
    ///
    /// # Returns
    ///
    /// A new API server instance
    pub fn new(
        config: Config,
        registry: Arc<SourceRegistry>,
        orchestrator: ValidationOrchestrator,
    ) -> Self {
        Self {
            config: Arc::new(config),
            aggregator: MultiChainAggregator::new(Arc::clone(&registry)),
            registry,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Serves the API until `shutdown` is cancelled.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Server stopped after shutdown was requested
    /// * `Err(anyhow::Error)` - Invalid bind address or failed to bind
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let host: IpAddr = self
            .config
            .api
            .host
            .parse()
            .with_context(|| format!("api.host '{}' is not an IP address", self.config.api.host))?;
        let addr = SocketAddr::new(host, self.config.api.port);

        let routes = self.create_routes();
        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await })
            .with_context(|| format!("Failed to bind API server to {}", addr))?;

        info!("API server listening on {}", bound);
        server.await;
        info!("API server stopped");
        Ok(())
    }

    /// Creates all API routes for the server.
    ///
    /// # Returns
    ///
    /// A warp filter containing all API routes
    pub(crate) fn create_routes(
        &self,
    ) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
        use super::swap;

        // Health check endpoint - returns service status and per-chain stream stats
        let health = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_registry(self.registry.clone()))
            .and_then(health_handler);

        // Latest events endpoint - one non-blocking sweep over every chain buffer
        let latest = warp::path!("v1" / "swap" / "latest")
            .and(warp::get())
            .and(with_aggregator(self.aggregator.clone()))
            .and_then(swap::latest_swaps_handler);

        // Validation endpoint - looks up the swap, signs it, returns the signature
        let validation = warp::path!("v1" / "swap" / "validation")
            .and(warp::post())
            .and(warp::body::bytes())
            .and(with_orchestrator(self.orchestrator.clone()))
            .and_then(|body: Bytes, orchestrator: Arc<ValidationOrchestrator>| async move {
                let body_str = String::from_utf8_lossy(&body);
                debug!("POST /v1/swap/validation - Received body: {}", body_str);

                match serde_json::from_slice::<swap::SwapValidationRequest>(&body) {
                    Ok(request) => swap::validate_swap_handler(request, orchestrator).await,
                    Err(e) => Err(warp::reject::custom(JsonDeserializeError(format!(
                        "Invalid JSON: {}",
                        e
                    )))),
                }
            });

        health.or(latest).or(validation).recover(handle_rejection)
    }

    /// Public method for testing - exposes routes for integration tests
    pub fn test_routes(
        &self,
    ) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
        self.create_routes()
    }
}
