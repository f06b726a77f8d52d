//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the swap verifier service.
//! Configuration includes the event monitor endpoint and watched chains, the threshold
//! signer endpoint, and API server settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::monitor::types::{decode_hex, ChainId, FinalityPolicy, BRIDGE_RECEIPT_EVENT, EVM_ADDRESS_LEN};
use crate::signer::DEFAULT_DST;

/// Environment variable selecting the TOML configuration file.
pub const CONFIG_PATH_ENV: &str = "SWAP_VERIFIER_CONFIG_PATH";

/// Configuration file used when `SWAP_VERIFIER_CONFIG_PATH` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config/swap_verifier.toml";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all service settings.
///
/// This structure holds configuration for:
/// - API server binding
/// - Remote event monitor connection and the chains it watches
/// - Threshold signer connection and the accepted domain-separation tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration (host, port)
    pub api: ApiConfig,
    /// Event monitor configuration (endpoint, chains, contract, buffering)
    pub monitor: MonitorConfig,
    /// Threshold signer configuration (endpoint, accepted DST)
    pub signer: SignerConfig,
}

/// API server configuration for external communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host address to bind the API server to
    pub host: String,
    /// Port number to bind the API server to
    pub port: u16,
}

/// Remote event monitor configuration.
///
/// One `BridgeReceipt` registration and one local buffer are created per entry
/// of `chain_ids` at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Base URL of the event monitor
    pub url: String,
    /// Timeout for unary monitor calls in milliseconds
    pub timeout_ms: u64,
    /// Chains to watch
    pub chain_ids: Vec<ChainId>,
    /// Bridge contract address (20-byte hex, same on every chain)
    pub contract_address: String,
    /// Event name registered on every chain
    #[serde(default = "default_event_name")]
    pub event_name: String,
    /// Finality policy the monitor applies before reporting
    #[serde(default = "default_finality")]
    pub finality: FinalityPolicy,
    /// Capacity of each per-chain buffer (occurrences beyond it are dropped)
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Position of the correlation id (swap id) in the registered schema
    #[serde(default = "default_correlation_field_index")]
    pub correlation_field_index: u32,
    /// Treat an occurrence from an unmonitored chain as an invalid swap
    #[serde(default)]
    pub strict_chain_check: bool,
}

/// Threshold signer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Base URL of the signer (`/sign` is appended)
    pub host: String,
    /// Timeout for signing calls in milliseconds
    pub timeout_ms: u64,
    /// The only domain-separation tag accepted from the signer
    #[serde(default = "default_accepted_dst")]
    pub accepted_dst: String,
}

fn default_event_name() -> String {
    BRIDGE_RECEIPT_EVENT.to_string()
}

fn default_finality() -> FinalityPolicy {
    FinalityPolicy::Latest
}

fn default_buffer_capacity() -> usize {
    100
}

fn default_correlation_field_index() -> u32 {
    1
}

fn default_accepted_dst() -> String {
    DEFAULT_DST.to_string()
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl Config {
    /// Loads configuration from the TOML file and the process environment.
    ///
    /// This function:
    /// 1. Reads the file named by `SWAP_VERIFIER_CONFIG_PATH` (default `config/swap_verifier.toml`)
    /// 2. Falls back to the built-in defaults when that file does not exist
    /// 3. Applies environment overrides (`PORT`, `CHAIN_MONITOR_URL`, `DSIGNER_HOST`, ...)
    /// 4. Validates and normalizes the result
    ///
    /// # Returns
    ///
    /// - `Ok(Config)` - Successfully loaded and validated configuration
    /// - `Err(anyhow::Error)` - Unreadable file, bad TOML, bad override or invalid value
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read configuration file '{}'", config_path))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse configuration file '{}'", config_path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration from TOML text without validating it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Creates the default configuration.
    ///
    /// Values match a local development setup: monitor on port 8080, signer on
    /// port 8082, two local chains (1337 and 1338).
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8060,
            },
            monitor: MonitorConfig {
                url: "http://localhost:8080".to_string(),
                timeout_ms: 10_000,
                chain_ids: vec![1337, 1338],
                contract_address: "0x20EEF038C83B7a0f357D4aBC64b8f639427D7Af6".to_string(),
                event_name: default_event_name(),
                finality: default_finality(),
                buffer_capacity: default_buffer_capacity(),
                correlation_field_index: default_correlation_field_index(),
                strict_chain_check: false,
            },
            signer: SignerConfig {
                host: "http://localhost:8082".to_string(),
                timeout_ms: 15_000,
                accepted_dst: default_accepted_dst(),
            },
        }
    }

    /// Applies environment overrides using `lookup` to read variables.
    ///
    /// Timeouts are given in whole seconds, like the deployment environment
    /// sets them. Tests pass a map lookup instead of the process environment.
    ///
    /// # Arguments
    ///
    /// * `lookup` - Returns the value of a variable, or `None` if unset
    ///
    /// # Returns
    ///
    /// * `Ok(())` - All present overrides were applied
    /// * `Err(anyhow::Error)` - An override could not be parsed
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.api.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{}'", port))?;
        }
        if let Some(url) = lookup("CHAIN_MONITOR_URL") {
            self.monitor.url = url;
        }
        if let Some(host) = lookup("DSIGNER_HOST") {
            self.signer.host = host;
        }
        if let Some(secs) = lookup("CHAIN_MONITOR_TIMEOUT_SECONDS") {
            self.monitor.timeout_ms = parse_seconds("CHAIN_MONITOR_TIMEOUT_SECONDS", &secs)?;
        }
        if let Some(secs) = lookup("DSIGNER_TIMEOUT_SECONDS") {
            self.signer.timeout_ms = parse_seconds("DSIGNER_TIMEOUT_SECONDS", &secs)?;
        }
        if let Some(ids) = lookup("CHAIN_IDS") {
            self.monitor.chain_ids = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| {
                    id.parse::<ChainId>()
                        .with_context(|| format!("CHAIN_IDS entry '{}' is not a chain id", id))
                })
                .collect::<Result<_>>()?;
        }
        if let Some(address) = lookup("ROUTER_CONTRACT") {
            self.monitor.contract_address = address;
        }
        if let Some(capacity) = lookup("EVENT_BUFFER_CAPACITY") {
            self.monitor.buffer_capacity = capacity.trim().parse().with_context(|| {
                format!("EVENT_BUFFER_CAPACITY must be a number, got '{}'", capacity)
            })?;
        }
        Ok(())
    }

    /// Validates the configuration and normalizes endpoint URLs.
    ///
    /// Both endpoints must be http(s) URLs with a host; trailing slashes are stripped.
    pub fn validate(&mut self) -> Result<()> {
        self.monitor.url = validate_url(&self.monitor.url, "monitor.url")?;
        self.signer.host = validate_url(&self.signer.host, "signer.host")?;

        if self.monitor.timeout_ms == 0 {
            anyhow::bail!("monitor.timeout_ms must be greater than zero");
        }
        if self.signer.timeout_ms == 0 {
            anyhow::bail!("signer.timeout_ms must be greater than zero");
        }
        if self.monitor.chain_ids.is_empty() {
            anyhow::bail!("monitor.chain_ids must list at least one chain");
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.monitor.chain_ids.iter().find(|id| !seen.insert(**id)) {
            anyhow::bail!("monitor.chain_ids lists chain {} more than once", dup);
        }
        if self.monitor.buffer_capacity == 0 {
            anyhow::bail!("monitor.buffer_capacity must be greater than zero");
        }
        if self.monitor.event_name.trim().is_empty() {
            anyhow::bail!("monitor.event_name must not be empty");
        }
        self.contract_address_bytes()?;
        if self.signer.accepted_dst.is_empty() {
            anyhow::bail!("signer.accepted_dst must not be empty");
        }
        Ok(())
    }

    /// Decodes the watched contract address.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - 20 address bytes
    /// * `Err(anyhow::Error)` - Not hex, or not 20 bytes long
    pub fn contract_address_bytes(&self) -> Result<Vec<u8>> {
        self.monitor.contract_address_bytes()
    }
}

impl MonitorConfig {
    /// Decodes the watched contract address (20 bytes).
    pub fn contract_address_bytes(&self) -> Result<Vec<u8>> {
        let bytes = decode_hex(&self.contract_address).with_context(|| {
            format!(
                "monitor.contract_address '{}' is not valid hex",
                self.contract_address
            )
        })?;
        if bytes.len() != EVM_ADDRESS_LEN {
            anyhow::bail!(
                "monitor.contract_address must be {} bytes, got {}",
                EVM_ADDRESS_LEN,
                bytes.len()
            );
        }
        Ok(bytes)
    }
}

fn parse_seconds(name: &str, raw: &str) -> Result<u64> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got '{}'", name, raw))?;
    Ok(secs.saturating_mul(1000))
}

/// Checks that `raw` is an http(s) URL with a host and returns it without trailing `/`.
fn validate_url(raw: &str, name: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim())
        .with_context(|| format!("{} '{}' is not a valid URL", name, raw))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => anyhow::bail!("{} must use http or https, got scheme '{}'", name, other),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        anyhow::bail!("{} '{}' has no host", name, raw);
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
