// ABOUTME: Integration tests for /secure/compute, /secure/verify, attestation, and /admin/* routes
// ABOUTME: Covers the admin-gating contract and the encrypted-domain compute dispatch

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod helpers;

use helpers::axum_test::AxumTestRequest;
use helpers::test_app::spawn_app;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

async fn login(app: &axum::Router, email: &str) -> String {
    AxumTestRequest::post("/auth/register")
        .json(&json!({"email": email, "username": email, "password": "Abcdefg1"}))
        .send(app.clone())
        .await;
    let resp = AxumTestRequest::post("/auth/login")
        .json(&json!({"email": email, "password": "Abcdefg1"}))
        .send(app.clone())
        .await;
    resp.json::<LoginResponse>().access_token
}

/// An `aggregate sum` compute op runs over an encrypted map without the
/// caller ever submitting plaintext.
#[tokio::test]
async fn compute_aggregate_sums_a_named_field() {
    let test_app = spawn_app().await;
    let token = login(&test_app.router, "a@x.com").await;

    let encrypt = AxumTestRequest::post("/secure/encrypt")
        .bearer(&token)
        .json(&json!({"data": {"a": {"count": 3}, "b": {"count": 7}}, "data_id": "batch"}))
        .send(test_app.router.clone())
        .await;
    assert_eq!(encrypt.status(), axum::http::StatusCode::OK);
    let encrypted: serde_json::Value = encrypt.json();

    let compute = AxumTestRequest::post("/secure/compute")
        .bearer(&token)
        .json(&json!({
            "operation": "aggregate",
            "encrypted_data": encrypted["encrypted_data"],
            "params": {"field": "count", "operation": "sum"},
        }))
        .send(test_app.router.clone())
        .await;
    assert_eq!(compute.status(), axum::http::StatusCode::OK);
    let body: serde_json::Value = compute.json();
    assert!((body["result"]["result"].as_f64().expect("numeric sum") - 10.0).abs() < f64::EPSILON);
}

/// `/secure/verify` confirms a hash produced via hashing the same payload.
#[tokio::test]
async fn verify_round_trips_through_hash() {
    let test_app = spawn_app().await;
    let token = login(&test_app.router, "a@x.com").await;

    let payload = json!({"value": "secret"});
    let data_bytes = payload.to_string();
    let expected_hash = test_app.state.crypto.lock().await.hash(data_bytes.as_bytes());

    let verify = AxumTestRequest::post("/secure/verify")
        .bearer(&token)
        .json(&json!({"data": payload, "hash_value": expected_hash}))
        .send(test_app.router.clone())
        .await;
    assert_eq!(verify.status(), axum::http::StatusCode::OK);
    let body: serde_json::Value = verify.json();
    assert_eq!(body["is_valid"], true);
}

/// A non-admin caller is forbidden from reading attestation data.
#[tokio::test]
async fn attestation_requires_admin() {
    let test_app = spawn_app().await;
    let token = login(&test_app.router, "a@x.com").await;

    let resp = AxumTestRequest::get("/secure/attestation")
        .bearer(&token)
        .send(test_app.router.clone())
        .await;
    assert_eq!(resp.status(), axum::http::StatusCode::FORBIDDEN);
}

/// An admin caller sees simulated attestation data, never a real quote.
#[tokio::test]
async fn admin_sees_simulated_attestation() {
    let test_app = spawn_app().await;
    let token = login(&test_app.router, "admin@x.com").await;
    test_app
        .state
        .catalog
        .promote_to_admin("admin@x.com")
        .await
        .expect("promote to admin");

    let resp = AxumTestRequest::get("/secure/attestation")
        .bearer(&token)
        .send(test_app.router.clone())
        .await;
    assert_eq!(resp.status(), axum::http::StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["attestation_data"]["mode"], "simulation");
    assert!(body["attestation_data"]["quote"].is_null());
}

/// `/admin/stats` and `/admin/cache/invalidate` are reachable only for admins
/// and report the wired-in cache subsystem.
#[tokio::test]
async fn admin_stats_and_cache_invalidate() {
    let test_app = spawn_app().await;
    let token = login(&test_app.router, "admin@x.com").await;
    test_app
        .state
        .catalog
        .promote_to_admin("admin@x.com")
        .await
        .expect("promote to admin");

    let stats = AxumTestRequest::get("/admin/stats")
        .bearer(&token)
        .send(test_app.router.clone())
        .await;
    assert_eq!(stats.status(), axum::http::StatusCode::OK);
    let body: serde_json::Value = stats.json();
    assert_eq!(body["cache_enabled"], true);
    assert_eq!(body["crypto_enabled"], true);

    let invalidate = AxumTestRequest::post("/admin/cache/invalidate")
        .bearer(&token)
        .json(&json!({"pattern": "cell_*"}))
        .send(test_app.router.clone())
        .await;
    assert_eq!(invalidate.status(), axum::http::StatusCode::OK);
}
