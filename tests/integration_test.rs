// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Integration tests for the relay's JSON endpoints and middleware.

mod harness;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use classroom_alert_relay::line::OutgoingMessage;
use classroom_alert_relay::webhook::{sign, SIGNATURE_HEADER, WELCOME_TEXT};
use harness::mock::MockMessagingClient;
use harness::{json_body, raw_body, TestApp, CHANNEL_SECRET};
use serde_json::json;
use tower::ServiceExt;

fn get(path: &str) -> Request<Body> {
    Request::get(path).body(Body::empty()).unwrap()
}

fn post_json(path: &str, body: &serde_json::Value) -> Request<Body> {
    Request::post(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn broadcast_body() -> serde_json::Value {
    json!({
        "image_url": "https://alerts.example.org/public/uploads/cap_1.jpg",
        "preview_image_url": "https://alerts.example.org/public/uploads/cap_1_small.jpg",
        "message": "ใช้งานเกินเวลา",
        "classroom": "ห้อง 204",
        "overuse_time": "15:45",
    })
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::with_config(MockMessagingClient::succeeding(), |config| {
        config.base_url = Some("https://alerts.example.org".to_string());
    })
    .await;

    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["base_url"], "https://alerts.example.org");
    assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());
    assert!(!body["endpoints"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_rate_limit_over_burst() {
    let app = TestApp::new(MockMessagingClient::succeeding()).await;

    let mut limited = Vec::new();
    for _ in 0..11 {
        let response = app.router.clone().oneshot(get("/health")).await.unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            assert!(response.headers().contains_key(header::RETRY_AFTER));
            limited.push(json_body(response).await);
        }
    }

    assert!(!limited.is_empty());
    assert_eq!(limited[0]["error"], "Too many requests");
    assert!(limited[0]["retry_after_secs"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_firebase_config_incomplete() {
    let app = TestApp::with_config(MockMessagingClient::succeeding(), |config| {
        config.firebase.api_key = Some("key".to_string());
    })
    .await;

    let response = app.router.clone().oneshot(get("/firebase-config")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await["error"],
        "Server configuration is incomplete."
    );
}

#[tokio::test]
async fn test_firebase_config_complete() {
    let app = TestApp::with_config(MockMessagingClient::succeeding(), |config| {
        config.firebase.api_key = Some("key".to_string());
        config.firebase.auth_domain = Some("demo.firebaseapp.com".to_string());
        config.firebase.project_id = Some("demo".to_string());
        config.firebase.app_id = Some("1:2:web:3".to_string());
    })
    .await;

    let response = app.router.clone().oneshot(get("/firebase-config")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["apiKey"], "key");
    assert_eq!(body["authDomain"], "demo.firebaseapp.com");
    assert_eq!(body["projectId"], "demo");
    assert_eq!(body["appId"], "1:2:web:3");
    assert_eq!(body["storageBucket"], "");
}

#[tokio::test]
async fn test_manual_broadcast() {
    let app = TestApp::new(MockMessagingClient::succeeding()).await;

    let response = app
        .router
        .clone()
        .oneshot(post_json("/broadcast", &broadcast_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "success");

    let broadcasts = app.client.broadcasts.lock().unwrap();
    assert_eq!(
        broadcasts[0][0],
        OutgoingMessage::image(
            "https://alerts.example.org/public/uploads/cap_1.jpg",
            "https://alerts.example.org/public/uploads/cap_1_small.jpg",
        )
    );
    assert!(matches!(
        &broadcasts[0][1],
        OutgoingMessage::Text { text } if text.contains("15:45") && text.contains("ห้อง 204")
    ));
}

#[tokio::test]
async fn test_manual_broadcast_invalid_body() {
    let app = TestApp::new(MockMessagingClient::succeeding()).await;

    let mut missing = broadcast_body();
    missing.as_object_mut().unwrap().remove("classroom");
    let mut blank = broadcast_body();
    blank["message"] = json!("  ");

    for body in [missing, blank] {
        let response = app
            .router
            .clone()
            .oneshot(post_json("/broadcast", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid request body");
    }

    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/broadcast")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.client.broadcast_calls(), 0);
}

#[tokio::test]
async fn test_manual_broadcast_failure() {
    let app = TestApp::new(MockMessagingClient::always_failing()).await;

    let response = app
        .router
        .clone()
        .oneshot(post_json("/broadcast", &broadcast_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "Failed to broadcast message");
    assert_eq!(app.client.broadcast_calls(), 3);
}

fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/webhook").header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_signed_webhook_replies() {
    let app = TestApp::new(MockMessagingClient::succeeding()).await;
    let body = json!({
        "destination": "Uabc",
        "events": [
            {
                "type": "message",
                "replyToken": "token-1",
                "source": { "type": "user", "userId": "U1" },
                "message": { "type": "text", "id": "42", "text": "สวัสดี" }
            },
            { "type": "follow", "replyToken": "token-2" },
            { "type": "unfollow", "source": { "type": "user", "userId": "U2" } }
        ]
    })
    .to_string();
    let signature = sign(CHANNEL_SECRET, body.as_bytes()).unwrap();

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(&body, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));

    let replies = app.client.replies.lock().unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].0, "token-1");
    assert_eq!(
        replies[0].1,
        vec![OutgoingMessage::text("สวัสดี! รับข้อความแล้ว: สวัสดี")]
    );
    assert_eq!(replies[1].0, "token-2");
    assert_eq!(replies[1].1, vec![OutgoingMessage::text(WELCOME_TEXT)]);
}

#[tokio::test]
async fn test_webhook_reply_failure_still_acknowledged() {
    let app = TestApp::new(MockMessagingClient::failing_replies()).await;
    let body = json!({
        "events": [{ "type": "follow", "replyToken": "expired" }]
    })
    .to_string();
    let signature = sign(CHANNEL_SECRET, body.as_bytes()).unwrap();

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(&body, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_signature_required() {
    let app = TestApp::new(MockMessagingClient::succeeding()).await;
    let body = json!({ "events": [{ "type": "follow", "replyToken": "t" }] }).to_string();
    let forged = sign("another-secret", body.as_bytes()).unwrap();

    for signature in [None, Some(forged.as_str()), Some("not base64!")] {
        let response = app
            .router
            .clone()
            .oneshot(webhook_request(&body, signature))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    assert!(app.client.replies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = TestApp::new(MockMessagingClient::succeeding()).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/record")
                .header(header::ORIGIN, "http://localhost:5500")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5500"
    );
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
        "true"
    );

    // Unlisted origins get no CORS headers
    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/health")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_index_and_static_assets() {
    let app = TestApp::new(MockMessagingClient::succeeding()).await;
    let static_dir = &app.state.config.static_dir;
    std::fs::create_dir_all(static_dir).unwrap();
    std::fs::write(static_dir.join("index.html"), "<h1>relay</h1>").unwrap();
    std::fs::write(static_dir.join("app.js"), "console.log(1)").unwrap();

    let response = app.router.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(raw_body(response).await, b"<h1>relay</h1>");

    let response = app.router.clone().oneshot(get("/static/app.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(raw_body(response).await, b"console.log(1)");
}
