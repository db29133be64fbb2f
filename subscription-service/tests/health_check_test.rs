//! HTTP surface tests for subscription-service.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{test_config, TestApp, TestHarness};
use reqwest::Client;
use rust_decimal::Decimal;
use std::sync::Arc;
use subscription_service::dtos::{CreateSubscriptionRequest, RecordPaymentRequest};
use subscription_service::models::{BillingInterval, PlanTier};
use subscription_service::services::SubscriptionLifecycle;
use subscription_service::startup::{router, AppState};
use tower::ServiceExt;
use uuid::Uuid;

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::spawn().await;
    let client = Client::new();

    let response = client
        .get(format!("{}/health", app.http_address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "subscription-service-test");
}

#[tokio::test]
async fn readiness_check_works() {
    let app = TestApp::spawn().await;
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", app.http_address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
}

#[tokio::test]
async fn unhealthy_repository_reports_unavailable() {
    let app = TestApp::spawn().await;
    app.harness.repo.set_unhealthy();
    let client = Client::new();

    let health = client
        .get(format!("{}/health", app.http_address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(health.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let ready = client
        .get(format!("{}/ready", app.http_address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(ready.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_endpoint_works() {
    let app = TestApp::spawn().await;
    let client = Client::new();

    let response = client
        .get(format!("{}/metrics", app.http_address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert!(response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap_or("").contains("text/plain"))
        .unwrap_or(false));
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = TestApp::spawn().await;
    let client = Client::new();

    let response = client
        .get(format!("{}/health", app.http_address))
        .header("x-request-id", "req-123")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-123")
    );
}

#[tokio::test]
async fn sweep_endpoint_runs_failed_payment_sweep() {
    let app = TestApp::spawn().await;
    let tenant_id = Uuid::new_v4();
    let manager = &app.harness.manager;
    manager
        .create_subscription(
            tenant_id,
            CreateSubscriptionRequest::new(PlanTier::Starter, BillingInterval::Monthly),
        )
        .await
        .unwrap();
    for _ in 0..3 {
        manager
            .record_payment(
                tenant_id,
                RecordPaymentRequest {
                    amount: Decimal::new(2999, 2),
                    succeeded: false,
                    recorded_at: None,
                },
            )
            .await
            .unwrap();
    }

    let response = Client::new()
        .post(format!(
            "{}/internal/sweeps/failed-payments",
            app.http_address
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let report: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(report["kind"], "failed_payments");
    assert_eq!(report["subscriptions_processed"], 1);
    assert_eq!(report["results"][0]["action"], "suspended");
}

#[tokio::test]
async fn unknown_sweep_is_not_found() {
    let harness = TestHarness::new();
    let app = router(AppState {
        config: test_config(),
        service: Arc::new(harness.manager.clone()),
    });

    let response = app
        .oneshot(
            Request::post("/internal/sweeps/everything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
