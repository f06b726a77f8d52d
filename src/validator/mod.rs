//! Swap Validation Module
//!
//! This module decides whether a swap was observed on a monitored chain and,
//! if so, obtains a threshold signature over it. The pipeline is:
//!
//! 1. Look up the bridge occurrence whose correlation field equals the swap id,
//!    scoped by the swap transaction hash
//! 2. Apply the validity predicate to that occurrence (derives `swap_status`)
//! 3. Sign the canonical swap message and return the hex signature
//!
//! Every failure is classified into a `ValidationOutcome` so operators can tell
//! "swap not yet observed" apart from "signer down". No signature is ever
//! produced for a failed or invalid swap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::lookup::{HistoricalEventLookup, LookupError};
use crate::monitor::{encode_hex, ChainId, EventOccurrence, EventTypeId};
use crate::signer::{SignaturePayload, SignerClient, SigningError};

// ============================================================================
// VALIDATION DATA STRUCTURES
// ============================================================================

/// A swap to be signed, with its derived validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    /// Cross-chain transaction hash of the swap
    pub swap_tx_hash: Vec<u8>,
    /// Correlation id of the swap
    pub swap_id: Vec<u8>,
    /// Result of the validity predicate, computed by the orchestrator
    pub swap_status: bool,
}

/// Signature returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponse {
    /// Lowercase hex signature without `0x`
    pub signature: String,
}

/// Classification of a validation request's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Success,
    InvalidRequest,
    NotFound,
    LookupFailed,
    SwapInvalid,
    SigningFailed,
    DomainTagMismatch,
    Cancelled,
}

impl ValidationOutcome {
    /// Stable label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::LookupFailed => "lookup_failed",
            Self::SwapInvalid => "swap_invalid",
            Self::SigningFailed => "signing_failed",
            Self::DomainTagMismatch => "domain_tag_mismatch",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a validation request produced no signature.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid validation request: {0}")]
    InvalidRequest(String),

    /// Historical lookup failed; `NotFound` and transport failures pass through unchanged
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("swap {swap_id} failed the validity check")]
    SwapInvalid { swap_id: String },

    #[error(transparent)]
    Signing(SigningError),

    #[error("signer domain tag mismatch: expected '{expected}', got '{got}'")]
    DomainTagMismatch { expected: String, got: String },

    #[error("validation cancelled by shutdown")]
    Cancelled,
}

impl From<SigningError> for ValidationError {
    fn from(e: SigningError) -> Self {
        match e {
            SigningError::DomainTagMismatch { expected, got } => {
                Self::DomainTagMismatch { expected, got }
            }
            other => Self::Signing(other),
        }
    }
}

impl ValidationError {
    pub fn outcome(&self) -> ValidationOutcome {
        match self {
            Self::InvalidRequest(_) => ValidationOutcome::InvalidRequest,
            Self::Lookup(LookupError::NotFound { .. }) => ValidationOutcome::NotFound,
            Self::Lookup(LookupError::Monitor { .. }) => ValidationOutcome::LookupFailed,
            Self::SwapInvalid { .. } => ValidationOutcome::SwapInvalid,
            Self::Signing(_) => ValidationOutcome::SigningFailed,
            Self::DomainTagMismatch { .. } => ValidationOutcome::DomainTagMismatch,
            Self::Cancelled => ValidationOutcome::Cancelled,
        }
    }
}

// ============================================================================
// VALIDITY PREDICATE
// ============================================================================

/// Decides whether an observed occurrence makes a swap valid.
pub trait ValidityPredicate: Send + Sync {
    fn evaluate(&self, swap_id: &[u8], occurrence: &EventOccurrence) -> bool;
}

/// Accepts any swap whose bridge occurrence was found.
///
/// An occurrence reported for a chain outside `monitored_chains` is logged;
/// with `strict_chain_check` it also makes the swap invalid.
#[derive(Debug, Clone)]
pub struct ObservedSwapPredicate {
    monitored_chains: Vec<ChainId>,
    strict_chain_check: bool,
}

impl ObservedSwapPredicate {
    pub fn new(monitored_chains: Vec<ChainId>, strict_chain_check: bool) -> Self {
        Self {
            monitored_chains,
            strict_chain_check,
        }
    }
}

impl ValidityPredicate for ObservedSwapPredicate {
    fn evaluate(&self, swap_id: &[u8], occurrence: &EventOccurrence) -> bool {
        if !self.monitored_chains.contains(&occurrence.chain_id) {
            warn!(
                swap_id = %encode_hex(swap_id),
                chain_id = occurrence.chain_id,
                strict = self.strict_chain_check,
                "Bridge occurrence reported for an unmonitored chain"
            );
            return !self.strict_chain_check;
        }
        true
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Combines historical lookup, the validity predicate and the signer.
#[derive(Clone)]
pub struct ValidationOrchestrator {
    lookup: HistoricalEventLookup,
    signer: SignerClient,
    predicate: Arc<dyn ValidityPredicate>,
    correlation_field_index: u32,
    cancel: CancellationToken,
}

impl ValidationOrchestrator {
    /// Creates an orchestrator.
    ///
    /// # Arguments
    ///
    /// * `lookup` - Historical lookup against the monitor
    /// * `signer` - Threshold signer client
    /// * `predicate` - Validity rule applied to the found occurrence
    /// * `correlation_field_index` - Schema position holding the swap id
    /// * `cancel` - Shutdown token; in-flight lookups and signing abort when it fires
    pub fn new(
        lookup: HistoricalEventLookup,
        signer: SignerClient,
        predicate: Arc<dyn ValidityPredicate>,
        correlation_field_index: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            lookup,
            signer,
            predicate,
            correlation_field_index,
            cancel,
        }
    }

    async fn cancellable<F: Future>(&self, future: F) -> Result<F::Output, ValidationError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ValidationError::Cancelled),
            output = future => Ok(output),
        }
    }

    /// Looks up the swap's bridge occurrence and applies the validity predicate.
    ///
    /// The swap transaction hash scopes the query and the swap id is matched
    /// exactly on the correlation field.
    ///
    /// # Returns
    ///
    /// * `Ok(bool)` - Occurrence found; whether the predicate accepts it
    /// * `Err(ValidationError)` - Empty input, `NotFound`, lookup failure or cancellation
    pub async fn validate(&self, swap_id: &[u8], swap_tx_hash: &[u8]) -> Result<bool, ValidationError> {
        if swap_id.is_empty() {
            return Err(ValidationError::InvalidRequest("swap_id is empty".to_string()));
        }
        if swap_tx_hash.is_empty() {
            return Err(ValidationError::InvalidRequest("swap_tx_hash is empty".to_string()));
        }

        let scope = EventTypeId::from(swap_tx_hash);
        let occurrence = self
            .cancellable(self.lookup.find_by_correlation_id(
                &scope,
                self.correlation_field_index,
                swap_id,
            ))
            .await??;

        Ok(self.predicate.evaluate(swap_id, &occurrence))
    }

    /// Signs a validated request.
    ///
    /// A request whose `swap_status` is false is refused: the signed message
    /// does not carry the status, so any signature would attest an invalid swap.
    pub async fn sign_and_respond(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationResponse, ValidationError> {
        if !request.swap_status {
            return Err(ValidationError::SwapInvalid {
                swap_id: encode_hex(&request.swap_id),
            });
        }

        let payload = SignaturePayload::new(&request.swap_tx_hash, &request.swap_id);
        let signature = self.cancellable(self.signer.sign(&payload)).await??;

        Ok(ValidationResponse {
            signature: hex::encode(signature),
        })
    }

    /// Runs the whole pipeline for one inbound request and logs its outcome.
    pub async fn handle(
        &self,
        swap_id: &[u8],
        swap_tx_hash: &[u8],
    ) -> Result<ValidationResponse, ValidationError> {
        let result = async {
            let swap_status = self.validate(swap_id, swap_tx_hash).await?;
            let request = ValidationRequest {
                swap_tx_hash: swap_tx_hash.to_vec(),
                swap_id: swap_id.to_vec(),
                swap_status,
            };
            self.sign_and_respond(&request).await
        }
        .await;

        match &result {
            Ok(_) => info!(
                swap_id = %encode_hex(swap_id),
                outcome = ValidationOutcome::Success.label(),
                "Swap validated and signed"
            ),
            Err(e) => warn!(
                swap_id = %encode_hex(swap_id),
                outcome = e.outcome().label(),
                "Swap validation failed: {}",
                e
            ),
        }
        result
    }
}
