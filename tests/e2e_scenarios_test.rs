// ABOUTME: End-to-end scenarios exercising the full HTTP surface in-process
// ABOUTME: One test per walkthrough: register/put/get, filter+sort+limit, delete+404, tamper, cross-user 403, pattern learning

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod helpers;

use cells_server::cache::patterns::PatternTracker;
use helpers::axum_test::AxumTestRequest;
use helpers::test_app::spawn_app;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CellView {
    key: String,
}

async fn register_and_login(app: &axum::Router, email: &str) -> String {
    AxumTestRequest::post("/auth/register")
        .json(&json!({"email": email, "username": email, "password": "Abcdefg1"}))
        .send(app.clone())
        .await;

    let resp = AxumTestRequest::post("/auth/login")
        .json(&json!({"email": email, "password": "Abcdefg1"}))
        .send(app.clone())
        .await;
    assert_eq!(resp.status(), axum::http::StatusCode::OK);
    resp.json::<LoginResponse>().access_token
}

async fn create_cell(app: &axum::Router, token: &str) -> String {
    let resp = AxumTestRequest::post("/cells")
        .bearer(token)
        .json(&json!({"password": "cellpw"}))
        .send(app.clone())
        .await;
    assert_eq!(resp.status(), axum::http::StatusCode::CREATED);
    resp.json::<CellView>().key
}

/// Register, create a cell, put an item, read it back unchanged.
#[tokio::test]
async fn put_then_get_round_trips() {
    let test_app = spawn_app().await;
    let token = register_and_login(&test_app.router, "a@x.com").await;
    let cell_key = create_cell(&test_app.router, &token).await;

    let put = AxumTestRequest::post(&format!("/cells/{cell_key}/data"))
        .bearer(&token)
        .json(&json!({"key": "greet", "value": "hello"}))
        .send(test_app.router.clone())
        .await;
    assert_eq!(put.status(), axum::http::StatusCode::OK);

    let get = AxumTestRequest::get(&format!("/cells/{cell_key}/data/greet"))
        .bearer(&token)
        .send(test_app.router.clone())
        .await;
    assert_eq!(get.status(), axum::http::StatusCode::OK);
    let body: serde_json::Value = get.json();
    assert_eq!(body["key"], "greet");
    assert_eq!(body["value"], "hello");
}

/// Query with a filter, descending sort, and limit over three items.
#[tokio::test]
async fn query_filters_sorts_and_limits() {
    let test_app = spawn_app().await;
    let token = register_and_login(&test_app.router, "a@x.com").await;
    let cell_key = create_cell(&test_app.router, &token).await;

    for (k, count, active) in [("n", 3, true), ("m", 7, true), ("o", 5, false)] {
        let put = AxumTestRequest::post(&format!("/cells/{cell_key}/data"))
            .bearer(&token)
            .json(&json!({"key": k, "value": {"count": count, "active": active}}))
            .send(test_app.router.clone())
            .await;
        assert_eq!(put.status(), axum::http::StatusCode::OK);
    }

    let resp = AxumTestRequest::post(&format!("/cells/{cell_key}/query"))
        .bearer(&token)
        .json(&json!({"filter": {"active": true}, "sort": ["-count"], "limit": 1}))
        .send(test_app.router.clone())
        .await;
    assert_eq!(resp.status(), axum::http::StatusCode::OK);
    let body: serde_json::Value = resp.json();
    let results = body["results"].as_array().expect("results array");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["count"], 7);
    assert_eq!(results[0]["active"], true);
}

/// Deleting an item removes it from the key listing and 404s on re-read.
#[tokio::test]
async fn delete_removes_item_and_read_back_is_not_found() {
    let test_app = spawn_app().await;
    let token = register_and_login(&test_app.router, "a@x.com").await;
    let cell_key = create_cell(&test_app.router, &token).await;

    AxumTestRequest::post(&format!("/cells/{cell_key}/data"))
        .bearer(&token)
        .json(&json!({"key": "temp", "value": "gone soon"}))
        .send(test_app.router.clone())
        .await;

    let del = AxumTestRequest::delete(&format!("/cells/{cell_key}/data/temp"))
        .bearer(&token)
        .send(test_app.router.clone())
        .await;
    assert_eq!(del.status(), axum::http::StatusCode::OK);

    let keys = AxumTestRequest::get(&format!("/cells/{cell_key}/keys"))
        .bearer(&token)
        .send(test_app.router.clone())
        .await;
    let body: serde_json::Value = keys.json();
    assert!(!body["keys"].as_array().expect("keys array").iter().any(|k| k == "temp"));

    let get = AxumTestRequest::get(&format!("/cells/{cell_key}/data/temp"))
        .bearer(&token)
        .send(test_app.router.clone())
        .await;
    assert_eq!(get.status(), axum::http::StatusCode::NOT_FOUND);
}

/// A tampered ciphertext byte fails integrity-checked decryption.
#[tokio::test]
async fn tampered_ciphertext_fails_decryption() {
    let test_app = spawn_app().await;
    let token = register_and_login(&test_app.router, "a@x.com").await;

    let encrypt = AxumTestRequest::post("/secure/encrypt")
        .bearer(&token)
        .json(&json!({"data": {"value": "secret"}, "data_id": "d"}))
        .send(test_app.router.clone())
        .await;
    assert_eq!(encrypt.status(), axum::http::StatusCode::OK);
    let body: serde_json::Value = encrypt.json();
    let mut envelope = body["encrypted_data"].clone();

    let ciphertext_b64 = envelope["ciphertext"].as_str().expect("ciphertext field").to_owned();
    let mut raw = {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;
        BASE64.decode(&ciphertext_b64).expect("valid base64 ciphertext")
    };
    raw[0] ^= 0xFF;
    let tampered_b64 = {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;
        BASE64.encode(raw)
    };
    envelope["ciphertext"] = serde_json::Value::String(tampered_b64);

    let decrypt = AxumTestRequest::post("/secure/decrypt")
        .bearer(&token)
        .json(&envelope)
        .send(test_app.router.clone())
        .await;
    assert_eq!(decrypt.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
}

/// A user with no ownership row on a cell is forbidden from reading its keys.
#[tokio::test]
async fn user_without_ownership_is_forbidden() {
    let test_app = spawn_app().await;
    let owner_token = register_and_login(&test_app.router, "owner@x.com").await;
    let other_token = register_and_login(&test_app.router, "other@x.com").await;
    let cell_key = create_cell(&test_app.router, &owner_token).await;

    let resp = AxumTestRequest::get(&format!("/cells/{cell_key}/keys"))
        .bearer(&other_token)
        .send(test_app.router.clone())
        .await;
    assert_eq!(resp.status(), axum::http::StatusCode::FORBIDDEN);
}

/// The access-pattern tracker learns that P2 is the hottest successor of
/// P1 across the sequence P1, P2, P1, P2, P3.
#[test]
fn pattern_tracker_learns_hottest_successor() {
    let mut tracker = PatternTracker::new();
    for key in ["P1", "P2", "P1", "P2", "P3"] {
        tracker.observe(key);
    }

    let likely = tracker.likely_next("P1");
    assert_eq!(likely.len(), 1);
    assert_eq!(likely[0].0, "P2");

    let likely_after_p2 = tracker.likely_next("P2");
    assert!(likely_after_p2.iter().any(|(k, _)| k == "P1" || k == "P3"));
}
