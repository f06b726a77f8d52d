//! Swap endpoints
//!
//! `GET /v1/swap/latest` and `POST /v1/swap/validation`.

use serde::Deserialize;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Reply;

use super::generic::ApiResponse;
use crate::aggregator::MultiChainAggregator;
use crate::monitor::decode_hex;
use crate::validator::{ValidationError, ValidationOrchestrator, ValidationOutcome, ValidationResponse};

/// Request body of the validation endpoint. Both fields are hex, `0x` optional.
#[derive(Debug, Deserialize)]
pub struct SwapValidationRequest {
    pub swap_id: String,
    pub swap_tx_hash: String,
}

/// HTTP status reported for each validation outcome.
pub fn status_for(outcome: ValidationOutcome) -> StatusCode {
    match outcome {
        ValidationOutcome::Success => StatusCode::OK,
        ValidationOutcome::InvalidRequest => StatusCode::BAD_REQUEST,
        ValidationOutcome::NotFound => StatusCode::NOT_FOUND,
        ValidationOutcome::SwapInvalid => StatusCode::UNPROCESSABLE_ENTITY,
        ValidationOutcome::SigningFailed => StatusCode::BAD_GATEWAY,
        ValidationOutcome::LookupFailed | ValidationOutcome::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ValidationOutcome::DomainTagMismatch => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(error: &ValidationError) -> warp::reply::Response {
    warp::reply::with_status(
        warp::reply::json(&ApiResponse::<ValidationResponse>::err(error.to_string())),
        status_for(error.outcome()),
    )
    .into_response()
}

/// Handler for the latest-swaps endpoint.
///
/// Returns the occurrences drained in one sweep as a bare JSON array, or
/// `204 No Content` when no chain has anything buffered.
pub async fn latest_swaps_handler(
    aggregator: MultiChainAggregator,
) -> Result<warp::reply::Response, warp::Rejection> {
    let drained = aggregator.drain_available();
    if drained.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(warp::reply::json(&drained).into_response())
}

/// Handler for the validation endpoint.
///
/// # Arguments
///
/// * `request` - Hex swap id and swap transaction hash
/// * `orchestrator` - The validation orchestrator
///
/// # Returns
///
/// * `Ok(Response)` - `200` with the bare `{"signature": hex}` body, or the status of the
///   failure category with an `ApiResponse` error envelope
pub async fn validate_swap_handler(
    request: SwapValidationRequest,
    orchestrator: Arc<ValidationOrchestrator>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let decoded = decode_hex(&request.swap_id)
        .map_err(|e| ValidationError::InvalidRequest(format!("swap_id is not hex: {}", e)))
        .and_then(|swap_id| {
            decode_hex(&request.swap_tx_hash)
                .map(|swap_tx_hash| (swap_id, swap_tx_hash))
                .map_err(|e| {
                    ValidationError::InvalidRequest(format!("swap_tx_hash is not hex: {}", e))
                })
        });

    let (swap_id, swap_tx_hash) = match decoded {
        Ok(pair) => pair,
        Err(e) => return Ok(error_reply(&e)),
    };

    match orchestrator.handle(&swap_id, &swap_tx_hash).await {
        Ok(response) => Ok(warp::reply::json(&response).into_response()),
        Err(e) => Ok(error_reply(&e)),
    }
}
