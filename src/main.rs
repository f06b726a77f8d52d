//! Swap Verifier Service
//!
//! Watches bridge receipts on every configured chain through the remote event
//! monitor and signs validated swaps with the threshold signer.
//!
//! ## Overview
//!
//! The swap verifier:
//! 1. Registers the bridge event with the monitor for each configured chain
//! 2. Buffers the monitor's push stream per chain (newest occurrence dropped when full)
//! 3. Serves the latest buffered occurrences over HTTP
//! 4. Validates swaps against recorded occurrences and returns a threshold signature

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use swap_verifier::api::ApiServer;
use swap_verifier::config::Config;
use swap_verifier::lookup::HistoricalEventLookup;
use swap_verifier::monitor::{ChainMonitor, HttpChainMonitor};
use swap_verifier::signer::SignerClient;
use swap_verifier::stream::SourceRegistry;
use swap_verifier::validator::{ObservedSwapPredicate, ValidationOrchestrator};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

/// Main application entry point that initializes and runs the swap verifier service.
///
/// This function:
/// 1. Initializes logging and tracing
/// 2. Loads configuration (TOML file plus environment overrides)
/// 3. Registers and opens one event stream per configured chain
/// 4. Starts the API server
/// 5. Tears every stream down on Ctrl-C
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging for debugging and monitoring
    tracing_subscriber::fmt::init();

    info!("Starting Swap Verifier Service");

    let config = Config::load()?;
    info!("Configuration loaded successfully");

    let shutdown = CancellationToken::new();

    let monitor: Arc<dyn ChainMonitor> = Arc::new(HttpChainMonitor::new(&config.monitor)?);
    let registry = Arc::new(
        SourceRegistry::start(&config.monitor, Arc::clone(&monitor), shutdown.clone())
            .await
            .context("Failed to start event streams")?,
    );

    let orchestrator = ValidationOrchestrator::new(
        HistoricalEventLookup::new(monitor),
        SignerClient::new(&config.signer)?,
        Arc::new(ObservedSwapPredicate::new(
            config.monitor.chain_ids.clone(),
            config.monitor.strict_chain_check,
        )),
        config.monitor.correlation_field_index,
        shutdown.clone(),
    );

    info!("All components initialized successfully");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let api_server = ApiServer::new(config, Arc::clone(&registry), orchestrator);
    let result = api_server.run(shutdown.clone()).await;

    shutdown.cancel();
    registry.shutdown().await;
    info!("Swap Verifier Service stopped");

    result
}
