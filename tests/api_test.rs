mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::seeded_service;
use serde_json::{json, Value};
use tower::ServiceExt;
use wallet_ledger::api::{router, ApiState, REQUEST_ID_HEADER};

async fn send(state: &ApiState, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = router(state.clone()).oneshot(request).await?;
    let status = response.status();
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn post_transaction(user: &str, source: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/user/{}/transaction", user))
        .header("Content-Type", "application/json");
    if let Some(source) = source {
        builder = builder.header("Source-Type", source);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn test_state() -> Result<(ApiState, tempfile::TempDir)> {
    let (service, temp) = seeded_service(&[(1, "100.00"), (2, "50.00")]).await?;
    Ok((ApiState::new(service, "test"), temp))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let (state, _temp) = test_state().await?;
    let (status, body) = send(&state, get("/health")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "env": "test"}));
    Ok(())
}

#[tokio::test]
async fn test_transaction_flow() -> Result<()> {
    let (state, _temp) = test_state().await?;
    let body = r#"{"state":"win","amount":"25.50","transactionId":"tx-1"}"#;

    let (status, json_body) = send(&state, post_transaction("1", Some("game"), body)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body,
        json!({"message": "transaction processed successfully", "balance": "125.50"})
    );

    let (status, json_body) = send(&state, post_transaction("1", Some("game"), body)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body, json!({"message": "transaction already processed"}));

    let (status, json_body) = send(&state, get("/user/1/balance")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body, json!({"userId": 1, "balance": "125.50"}));

    let overdraw = r#"{"state":"lose","amount":"500.00","transactionId":"tx-2"}"#;
    let (status, json_body) = send(&state, post_transaction("1", Some("server"), overdraw)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body, json!({"error": "insufficient balance"}));

    let (_, json_body) = send(&state, get("/user/1/balance")).await?;
    assert_eq!(json_body["balance"], "125.50");

    Ok(())
}

#[tokio::test]
async fn test_unknown_user() -> Result<()> {
    let (state, _temp) = test_state().await?;

    let (status, body) = send(&state, get("/user/404/balance")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "user not found"}));

    let request = post_transaction(
        "404",
        Some("payment"),
        r#"{"state":"win","amount":"1.00","transactionId":"nobody"}"#,
    );
    let (status, _) = send(&state, request).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_request_validation() -> Result<()> {
    let (state, _temp) = test_state().await?;
    let valid = r#"{"state":"win","amount":"1.00","transactionId":"v-1"}"#;

    let cases = [
        (post_transaction("0", Some("game"), valid), "invalid user id"),
        (post_transaction("abc", Some("game"), valid), "invalid user id"),
        (post_transaction("-7", Some("game"), valid), "invalid user id"),
        (
            post_transaction("1", None, valid),
            "Source-Type header is required",
        ),
        (
            post_transaction("1", Some("casino"), valid),
            "invalid Source-Type",
        ),
        (post_transaction("1", Some("game"), "{not json"), "invalid JSON"),
    ];
    for (request, expected) in cases {
        let (status, body) = send(&state, request).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], expected);
    }

    let bad_fields = [
        r#"{"state":"draw","amount":"1.00","transactionId":"v-2"}"#,
        r#"{"state":"win","amount":"one","transactionId":"v-3"}"#,
        r#"{"state":"win","amount":"-1.00","transactionId":"v-4"}"#,
        r#"{"state":"win","amount":"1.00","transactionId":""}"#,
        r#"{"state":"win","amount":"1.00"}"#,
    ];
    for body in bad_fields {
        let (status, json_body) = send(&state, post_transaction("2", Some("game"), body)).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {}", body);
        assert!(json_body["error"].is_string());
    }

    let (_, json_body) = send(&state, get("/user/2/balance")).await?;
    assert_eq!(json_body["balance"], "50.00");
    assert_eq!(state.service.repository().count_entries(2).await?, 0);

    Ok(())
}
