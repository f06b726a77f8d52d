//! Threshold Signer Client Module
//!
//! This module talks to the external threshold signer. A signing request is a
//! single `POST {host}/sign` carrying the canonical swap message:
//!
//! ```text
//! {"m": "$swap_tx_hash:<hex>; swap_id:<hex>$"}
//! ```
//!
//! The signer answers `{"signature": <base64 bytes>, "dst": <string>}`. Only
//! HTTP 200 is accepted, the domain-separation tag must equal the configured
//! value exactly, and the signature must be at least 32 bytes long.

use anyhow::Context;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SignerConfig;

/// Domain-separation tag of the BN254 threshold signer.
pub const DEFAULT_DST: &str = "dsigner-v01-BN254G1_XMD:KECCAK-256_SVDW_RO_";

/// Shortest signature accepted from the signer, in bytes.
pub const MIN_SIGNATURE_LEN: usize = 32;

// ============================================================================
// ERRORS
// ============================================================================

/// Failure to obtain a usable signature.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The signer could not be reached (connect failure, timeout, broken body)
    #[error("signer /sign call failed: {0}")]
    Unreachable(String),

    /// The signer answered with anything but 200
    #[error("signer /sign returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The signer's response body could not be decoded
    #[error("failed to decode signer /sign response: {0}")]
    Decode(String),

    /// The signer returned fewer bytes than a valid signature has
    #[error("signer returned a {len}-byte signature, at least {min} bytes required")]
    SignatureTooShort { len: usize, min: usize },

    /// The signer signed under an unexpected domain-separation tag
    #[error("signer domain tag mismatch: expected '{expected}', got '{got}'")]
    DomainTagMismatch { expected: String, got: String },
}

// ============================================================================
// WIRE STRUCTURES
// ============================================================================

/// Canonical message submitted for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignaturePayload {
    pub m: String,
}

impl SignaturePayload {
    /// Builds `$swap_tx_hash:<hex>; swap_id:<hex>$` with lowercase hex and no `0x`.
    pub fn new(swap_tx_hash: &[u8], swap_id: &[u8]) -> Self {
        Self {
            m: format!(
                "$swap_tx_hash:{}; swap_id:{}$",
                hex::encode(swap_tx_hash),
                hex::encode(swap_id)
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    /// Base64-encoded signature bytes
    signature: String,
    dst: String,
}

// ============================================================================
// SIGNER CLIENT
// ============================================================================

/// Client for the threshold signer's HTTP API
#[derive(Clone)]
pub struct SignerClient {
    client: Client,
    /// Base URL of the signer without trailing slash
    host: String,
    accepted_dst: String,
}

impl SignerClient {
    /// Creates a new signer client
    ///
    /// # Arguments
    ///
    /// * `config` - Signer host, timeout and accepted DST
    ///
    /// # Returns
    ///
    /// * `Ok(SignerClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to create HTTP client
    pub fn new(config: &SignerConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to create signer HTTP client")?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            accepted_dst: config.accepted_dst.clone(),
        })
    }

    pub fn accepted_dst(&self) -> &str {
        &self.accepted_dst
    }

    /// Requests a signature over `payload`.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - Signature bytes under the accepted DST
    /// * `Err(SigningError)` - Transport failure, non-200, bad body, wrong DST or short signature
    pub async fn sign(&self, payload: &SignaturePayload) -> Result<Vec<u8>, SigningError> {
        let url = format!("{}/sign", self.host);
        debug!("Requesting signature for {}", payload.m);

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| SigningError::Unreachable(e.to_string()))?;

        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            warn!(status, "Signer refused request");
            return Err(SigningError::Status { status, message });
        }

        let body: SignResponse = response
            .json()
            .await
            .map_err(|e| SigningError::Decode(e.to_string()))?;

        if body.dst != self.accepted_dst {
            return Err(SigningError::DomainTagMismatch {
                expected: self.accepted_dst.clone(),
                got: body.dst,
            });
        }

        let signature = general_purpose::STANDARD
            .decode(body.signature.trim())
            .map_err(|e| SigningError::Decode(format!("signature is not base64: {}", e)))?;

        if signature.len() < MIN_SIGNATURE_LEN {
            return Err(SigningError::SignatureTooShort {
                len: signature.len(),
                min: MIN_SIGNATURE_LEN,
            });
        }

        Ok(signature)
    }
}
