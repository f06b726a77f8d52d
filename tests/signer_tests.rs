//! Tests for the threshold signer client
//!
//! A wiremock server stands in for the signer's `/sign` endpoint.

use serde_json::json;
use swap_verifier::signer::{SignaturePayload, SignerClient, SigningError, MIN_SIGNATURE_LEN};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "mod.rs"]
mod test_helpers;

use test_helpers::{build_test_config, signer_response, TEST_DST};

async fn client_for(server: &MockServer) -> SignerClient {
    let config = build_test_config("http://127.0.0.1:9", &server.uri());
    SignerClient::new(&config.signer).unwrap()
}

async fn mount_sign(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/sign"))
        .respond_with(response)
        .mount(server)
        .await;
}

// ============================================================================
// PAYLOAD FORMAT
// ============================================================================

/// Test the canonical signing message
/// Why: The exact literal is the wire contract with the signer
#[test]
fn test_signature_payload_format() {
    let payload = SignaturePayload::new(&[0xbb, 0x01], &[0xaa]);
    assert_eq!(payload.m, "$swap_tx_hash:bb01; swap_id:aa$");
    assert_eq!(
        serde_json::to_value(&payload).unwrap(),
        json!({ "m": "$swap_tx_hash:bb01; swap_id:aa$" })
    );
}

// ============================================================================
// SIGNING
// ============================================================================

/// Test that a 32-byte signature under the accepted tag is returned
/// What is tested: request body sent to /sign and decoding of the response
/// Why: This is the minimal valid signer answer
#[tokio::test]
async fn test_sign_success() {
    let server = MockServer::start().await;
    let signature: Vec<u8> = (0u8..32).collect();
    Mock::given(method("POST"))
        .and(path("/sign"))
        .and(body_json(json!({ "m": "$swap_tx_hash:bb; swap_id:aa$" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(signer_response(&signature, TEST_DST)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let signed = client
        .sign(&SignaturePayload::new(&[0xbb], &[0xaa]))
        .await
        .unwrap();

    assert_eq!(signed, signature);
    assert_eq!(hex::decode(hex::encode(&signed)).unwrap(), signature);
}

/// Test that a 31-byte signature is refused
/// Why: A short signature means the signer succeeded transport-wise but is broken
#[tokio::test]
async fn test_sign_short_signature() {
    let server = MockServer::start().await;
    mount_sign(
        &server,
        ResponseTemplate::new(200).set_body_json(signer_response(&[0u8; 31], TEST_DST)),
    )
    .await;

    let client = client_for(&server).await;
    let result = client.sign(&SignaturePayload::new(&[0xbb], &[0xaa])).await;

    match result {
        Err(SigningError::SignatureTooShort { len, min }) => {
            assert_eq!(len, 31);
            assert_eq!(min, MIN_SIGNATURE_LEN);
        }
        other => panic!("expected short signature error, got {:?}", other),
    }
}

/// Test that a signature under another domain tag is refused
/// Why: A signature under an unexpected tag is meaningless to the caller
#[tokio::test]
async fn test_sign_domain_tag_mismatch() {
    let server = MockServer::start().await;
    mount_sign(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(signer_response(&[0u8; 48], "dsigner-v01-BLS12381G1_XMD:SHA-256_SSWU_RO_")),
    )
    .await;

    let client = client_for(&server).await;
    let result = client.sign(&SignaturePayload::new(&[0xbb], &[0xaa])).await;

    match result {
        Err(SigningError::DomainTagMismatch { expected, got }) => {
            assert_eq!(expected, TEST_DST);
            assert_eq!(got, "dsigner-v01-BLS12381G1_XMD:SHA-256_SSWU_RO_");
        }
        other => panic!("expected DST mismatch, got {:?}", other),
    }
}

/// Test that any status other than 200 is refused
/// What is tested: 500 and 201 answers from /sign
/// Why: Only HTTP 200 is a successful signing
#[tokio::test]
async fn test_sign_non_200_status() {
    for status in [500u16, 201] {
        let server = MockServer::start().await;
        mount_sign(
            &server,
            ResponseTemplate::new(status).set_body_json(signer_response(&[0u8; 32], TEST_DST)),
        )
        .await;

        let client = client_for(&server).await;
        let result = client.sign(&SignaturePayload::new(&[0xbb], &[0xaa])).await;

        assert!(
            matches!(result, Err(SigningError::Status { status: s, .. }) if s == status),
            "status {} should be refused",
            status
        );
    }
}

/// Test that an undecodable body is a decode error
/// Why: Garbage from the signer is never treated as a signature
#[tokio::test]
async fn test_sign_malformed_body() {
    let server = MockServer::start().await;
    mount_sign(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "signature": "***", "dst": TEST_DST })),
    )
    .await;

    let client = client_for(&server).await;
    let result = client.sign(&SignaturePayload::new(&[0xbb], &[0xaa])).await;
    assert!(matches!(result, Err(SigningError::Decode(_))));
}

/// Test that an unreachable signer is reported as such
/// Why: "Signer down" must be distinguishable from a bad answer
#[tokio::test]
async fn test_sign_unreachable() {
    let config = build_test_config("http://127.0.0.1:9", "http://127.0.0.1:1");
    let client = SignerClient::new(&config.signer).unwrap();

    let result = client.sign(&SignaturePayload::new(&[0xbb], &[0xaa])).await;
    assert!(matches!(result, Err(SigningError::Unreachable(_))));
}
