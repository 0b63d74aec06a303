use std::sync::Arc;

use alloy_primitives::B256;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{create_router, AppState};
use crate::authorization::{AuthorizationError, KnownRejection};
use crate::identity::{ASSERTION_HEADER, ORGANIZATION_HEADER, PUC_HEADER};
use crate::ledger::{LedgerError, MemoryLedger};
use crate::testing::{self, StubAuthorization, NOW};

struct Harness {
    router: Router,
    ledger: Arc<MemoryLedger>,
    authorization: Arc<StubAuthorization>,
}

fn harness() -> Harness {
    let ledger = Arc::new(testing::ledger());
    let authorization = Arc::new(StubAuthorization::new());
    let service = testing::service(ledger.clone(), authorization.clone());
    Harness {
        router: create_router(AppState::new(Arc::new(service))),
        ledger,
        authorization,
    }
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header(ASSERTION_HEADER, STANDARD.encode(testing::ASSERTION))
        .header(ORGANIZATION_HEADER, testing::ORG)
        .header(PUC_HEADER, testing::PUC)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn request_funds() -> Value {
    json!({ "action": "REQUEST_FUNDS", "labId": "7", "maxBatch": 25, "returnUrl": "https://lab.example/done" })
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["chainId"], 11155111);
}

#[tokio::test]
async fn test_prepare_action_happy_path() {
    let h = harness();
    let (status, body) = send(&h.router, post("/intents/actions/prepare", &request_funds())).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    assert_eq!(body["kind"], "action");
    assert_eq!(body["backendUrl"], testing::BACKEND);
    assert_eq!(body["requestId"], body["intent"]["meta"]["requestId"]);
    assert!(body["authorizationUrl"].as_str().unwrap().starts_with(testing::BACKEND));
    assert!(!body["backendAuthToken"].as_str().unwrap().is_empty());
    // Session expiry is earlier than the intent's, so it wins.
    assert_eq!(body["expiresAt"], NOW + 300);

    let meta = &body["intent"]["meta"];
    assert_eq!(meta["action"], 11);
    assert_eq!(meta["nonce"], "0");
    assert_eq!(meta["expiresAt"], NOW + 900);
    assert_eq!(body["intent"]["payload"]["maxBatch"], "25");
    assert_eq!(body["intent"]["typedData"]["primaryType"], "IntentMeta");
    assert_eq!(meta["signer"], json!(testing::relay_signer().address()));

    // The relay only signs once the ceremony is approved.
    assert!(body["intent"].get("signature").is_none());
    assert_eq!(h.authorization.calls(), 1);
}

#[tokio::test]
async fn test_prepare_reservation_happy_path() {
    let h = harness();
    let start = NOW + 3_600;
    let body = json!({ "labId": 7, "start": start, "end": start + 1_800, "price": "1500000" });
    let (status, body) = send(&h.router, post("/intents/reservations/prepare", &body)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["kind"], "reservation");
    assert_eq!(body["intent"]["meta"]["action"], 8);
    assert_eq!(body["intent"]["payload"]["start"], start);
}

#[tokio::test]
async fn test_missing_max_batch_fails_before_any_network_call() {
    let h = harness();
    let body = json!({ "action": "REQUEST_FUNDS", "labId": 7 });
    let (status, body) = send(&h.router, post("/intents/actions/prepare", &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELD");
    assert_eq!(body["details"]["field"], "maxBatch");
    assert_eq!(h.ledger.reads(), 0);
    assert_eq!(h.authorization.calls(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/intents/actions/prepare")
        .header(ASSERTION_HEADER, STANDARD.encode(testing::ASSERTION))
        .header(ORGANIZATION_HEADER, testing::ORG)
        .header(PUC_HEADER, testing::PUC)
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MALFORMED_BODY");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/intents/actions/prepare")
        .body(Body::from(request_funds().to_string()))
        .unwrap();
    let (status, body) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "IDENTITY_REQUIRED");
    assert_eq!(h.ledger.reads(), 0);
}

#[tokio::test]
async fn test_unknown_institution_is_unauthorized() {
    let h = harness();
    let mut request = post("/intents/actions/prepare", &request_funds());
    request
        .headers_mut()
        .insert(ORGANIZATION_HEADER, "unknown.example".parse().unwrap());
    let (status, body) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INSTITUTION_NOT_REGISTERED");
}

#[tokio::test]
async fn test_unregistered_credential_maps_to_conflict() {
    let h = harness();
    h.authorization
        .refuse_with(AuthorizationError::Rejected(KnownRejection::CredentialNotRegistered));
    let (status, body) = send(&h.router, post("/intents/actions/prepare", &request_funds())).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "WEBAUTHN_CREDENTIAL_NOT_REGISTERED");
    assert_eq!(body["error"], "webauthn_credential_not_registered");
    assert!(body["details"]["message"].as_str().unwrap().contains("WebAuthn"));
}

#[tokio::test]
async fn test_unmapped_backend_failure_is_bad_gateway() {
    let h = harness();
    h.authorization.refuse_with(AuthorizationError::Upstream {
        status: Some(500),
        code: Some("db_down".to_string()),
        message: "database unavailable".to_string(),
    });
    let (status, body) = send(&h.router, post("/intents/actions/prepare", &request_funds())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "INTENT_AUTHORIZATION_FAILED");
    assert_eq!(body["details"]["upstreamCode"], "db_down");
}

#[tokio::test]
async fn test_ledger_failure_is_bad_gateway_with_details() {
    let h = harness();
    h.ledger.fail_reads(LedgerError::Rpc {
        code: Some(-32000),
        message: "header not found".to_string(),
    });
    let (status, body) = send(&h.router, post("/intents/actions/prepare", &request_funds())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "LEDGER_RPC_ERROR");
    assert_eq!(body["details"]["rpcCode"], -32000);
    assert_eq!(body["details"]["message"], "header not found");
    assert_eq!(h.authorization.calls(), 0);
}

#[tokio::test]
async fn test_prepare_then_register() {
    let h = harness();
    let (_, prepared) = send(&h.router, post("/intents/actions/prepare", &request_funds())).await;

    let register = json!({
        "kind": prepared["kind"],
        "meta": prepared["intent"]["meta"],
        "payload": prepared["intent"]["payload"],
        "authorizationSessionId": prepared["authorizationSessionId"],
        "backendAuthToken": prepared["backendAuthToken"],
    });
    let (status, body) = send(&h.router, post("/intents/register", &register)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["requestId"], prepared["requestId"]);
    assert_eq!(body["blockNumber"], 2);

    // Replaying the same intent is stopped before the ledger.
    let (status, body) = send(&h.router, post("/intents/register", &register)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PREFLIGHT_FAILED");
    let codes: Vec<&str> = body["details"]["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["code"].as_str())
        .collect();
    assert!(codes.contains(&"REQUEST_ID_ALREADY_USED"));
    assert!(codes.contains(&"NONCE_MISMATCH"));
    assert_eq!(h.ledger.submissions(), 1);
}

#[tokio::test]
async fn test_register_surfaces_revert_as_bad_gateway() {
    let h = harness();
    let (_, prepared) = send(&h.router, post("/intents/actions/prepare", &request_funds())).await;
    h.ledger.fail_next_submission(LedgerError::Reverted {
        reason: "IntentExpired".to_string(),
        data: None,
        tx_hash: Some(B256::repeat_byte(0x99)),
    });

    let register = json!({
        "kind": "action",
        "meta": prepared["intent"]["meta"],
        "payload": prepared["intent"]["payload"],
        "authorizationSessionId": prepared["authorizationSessionId"],
        "backendAuthToken": prepared["backendAuthToken"],
    });
    let (status, body) = send(&h.router, post("/intents/register", &register)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "LEDGER_REVERTED");
    assert_eq!(body["details"]["reason"], "IntentExpired");
    assert_eq!(body["details"]["txHash"], json!(B256::repeat_byte(0x99)));
}

#[tokio::test]
async fn test_register_refuses_session_approved_for_another_intent() {
    let h = harness();
    let (_, funds) = send(&h.router, post("/intents/actions/prepare", &request_funds())).await;
    let delete = json!({ "action": "LAB_DELETE", "labId": 7 });
    let (status, delete) = send(&h.router, post("/intents/actions/prepare", &delete)).await;
    assert_eq!(status, StatusCode::OK, "{delete}");

    let register = |session: &Value, token: &Value| {
        json!({
            "kind": "action",
            "meta": delete["intent"]["meta"],
            "payload": delete["intent"]["payload"],
            "authorizationSessionId": session,
            "backendAuthToken": token,
        })
    };

    let request = register(&funds["authorizationSessionId"], &delete["backendAuthToken"]);
    let (status, body) = send(&h.router, post("/intents/register", &request)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INTENT_AUTHORIZATION_MISMATCH");

    let request = register(&delete["authorizationSessionId"], &funds["backendAuthToken"]);
    let (status, body) = send(&h.router, post("/intents/register", &request)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "INTENT_NOT_PREPARED");

    assert_eq!(h.ledger.submissions(), 0);
}

#[tokio::test]
async fn test_prepare_reservation_with_stale_price_is_rejected() {
    let h = harness();
    let start = NOW + 3_600;
    let body = json!({ "labId": 7, "start": start, "end": start + 1_800, "price": "1" });
    let (status, body) = send(&h.router, post("/intents/reservations/prepare", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "PRICE_MISMATCH");
    assert_eq!(body["details"]["field"], "price");
    assert_eq!(h.authorization.calls(), 0);
}
