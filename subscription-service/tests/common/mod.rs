//! Test helper module for subscription-service integration tests.
//!
//! Provides an HTTP test app plus an in-process harness whose repository and
//! notifier record what the service asked of them.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::config::Config as CoreConfig;
use service_core::error::AppError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use subscription_service::config::{BillingSettings, SubscriptionConfig};
use subscription_service::models::{
    BillingPeriod, ListSubscriptionsFilter, PaymentRecord, PlanChange, Subscription,
    SubscriptionPage, SubscriptionStats, UsageDimension,
};
use subscription_service::services::{
    init_metrics, InMemorySubscriptionRepository, SubscriptionManager, SubscriptionNotifier,
    SubscriptionRepository,
};
use subscription_service::startup::Application;
use uuid::Uuid;

// Test constants for tenant context
pub const TEST_TENANT_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const TEST_ACTOR_ID: &str = "22222222-2222-2222-2222-222222222222";

pub fn tenant_id() -> Uuid {
    Uuid::parse_str(TEST_TENANT_ID).unwrap()
}

pub fn actor_id() -> Uuid {
    Uuid::parse_str(TEST_ACTOR_ID).unwrap()
}

pub fn test_config() -> SubscriptionConfig {
    SubscriptionConfig {
        common: CoreConfig {
            port: 0, // Random port
            host: "127.0.0.1".to_string(),
        },
        service_name: "subscription-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        billing: BillingSettings::default(),
    }
}

/// Test application wrapper for HTTP integration tests.
pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub harness: TestHarness,
}

impl TestApp {
    /// Spawn a new test application on a random port.
    pub async fn spawn() -> Self {
        // Initialize metrics (required for metrics endpoint test)
        init_metrics();

        let harness = TestHarness::new();
        let app = Application::build_with(test_config(), Arc::new(harness.manager.clone()))
            .await
            .expect("Failed to build test application");

        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            http_port,
            harness,
        }
    }
}

/// A manager wired to recording collaborators.
#[derive(Clone)]
pub struct TestHarness {
    pub manager: SubscriptionManager,
    pub repo: Arc<RecordingRepository>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(BillingSettings::default())
    }

    pub fn with_settings(settings: BillingSettings) -> Self {
        init_metrics();

        let repo = Arc::new(RecordingRepository::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = SubscriptionManager::new(repo.clone(), notifier.clone(), settings);

        Self {
            manager,
            repo,
            notifier,
        }
    }

    /// Read the stored record directly, bypassing the service.
    pub async fn stored(&self, tenant_id: Uuid) -> Subscription {
        self.repo
            .inner
            .get_by_tenant(tenant_id)
            .await
            .unwrap()
            .expect("subscription should exist")
    }

    /// Rewrite the stored record, e.g. to move its period into the past.
    pub async fn rewrite<F>(&self, tenant_id: Uuid, f: F) -> Subscription
    where
        F: FnOnce(&mut Subscription),
    {
        let mut subscription = self.stored(tenant_id).await;
        f(&mut subscription);
        self.repo.inner.update(&subscription).await.unwrap()
    }
}

/// In-memory repository that counts writes and can fail on demand.
#[derive(Default)]
pub struct RecordingRepository {
    pub inner: InMemorySubscriptionRepository,
    writes: AtomicUsize,
    failing_tenants: Mutex<HashSet<Uuid>>,
    failing_touch: AtomicBool,
    unhealthy: AtomicBool,
}

impl RecordingRepository {
    /// Number of mutating calls made through the service.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every write for `tenant_id` fail.
    pub fn fail_writes_for(&self, tenant_id: Uuid) {
        self.failing_tenants.lock().unwrap().insert(tenant_id);
    }

    /// Make the last-modifier write fail while other writes succeed.
    pub fn fail_touches(&self) {
        self.failing_touch.store(true, Ordering::SeqCst);
    }

    pub fn set_unhealthy(&self) {
        self.unhealthy.store(true, Ordering::SeqCst);
    }

    fn write(&self, tenant_id: Uuid) -> Result<(), AppError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing_tenants.lock().unwrap().contains(&tenant_id) {
            return Err(AppError::InternalError(anyhow::anyhow!(
                "injected write failure"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for RecordingRepository {
    async fn get_by_tenant(&self, tenant_id: Uuid) -> Result<Option<Subscription>, AppError> {
        self.inner.get_by_tenant(tenant_id).await
    }

    async fn create(&self, subscription: &Subscription) -> Result<Subscription, AppError> {
        self.write(subscription.tenant_id)?;
        self.inner.create(subscription).await
    }

    async fn update(&self, subscription: &Subscription) -> Result<Subscription, AppError> {
        self.write(subscription.tenant_id)?;
        self.inner.update(subscription).await
    }

    async fn delete(&self, tenant_id: Uuid) -> Result<bool, AppError> {
        self.write(tenant_id)?;
        self.inner.delete(tenant_id).await
    }

    async fn touch(&self, tenant_id: Uuid, modified_by: Uuid) -> Result<(), AppError> {
        self.write(tenant_id)?;
        if self.failing_touch.load(Ordering::SeqCst) {
            return Err(AppError::ServiceUnavailable);
        }
        self.inner.touch(tenant_id, modified_by).await
    }

    async fn upgrade_plan(
        &self,
        tenant_id: Uuid,
        change: &PlanChange,
    ) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner.upgrade_plan(tenant_id, change).await
    }

    async fn downgrade_plan(
        &self,
        tenant_id: Uuid,
        change: &PlanChange,
        effective_immediately: bool,
        effective_at: DateTime<Utc>,
    ) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner
            .downgrade_plan(tenant_id, change, effective_immediately, effective_at)
            .await
    }

    async fn start_trial(
        &self,
        tenant_id: Uuid,
        period: BillingPeriod,
    ) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner.start_trial(tenant_id, period).await
    }

    async fn end_trial(
        &self,
        tenant_id: Uuid,
        period: BillingPeriod,
    ) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner.end_trial(tenant_id, period).await
    }

    async fn cancel(
        &self,
        tenant_id: Uuid,
        reason: Option<String>,
        at_period_end: bool,
    ) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner.cancel(tenant_id, reason, at_period_end).await
    }

    async fn reactivate(
        &self,
        tenant_id: Uuid,
        period: BillingPeriod,
    ) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner.reactivate(tenant_id, period).await
    }

    async fn suspend(&self, tenant_id: Uuid, reason: &str) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner.suspend(tenant_id, reason).await
    }

    async fn increment_usage(
        &self,
        tenant_id: Uuid,
        dimension: UsageDimension,
        amount: i64,
    ) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner.increment_usage(tenant_id, dimension, amount).await
    }

    async fn decrement_usage(
        &self,
        tenant_id: Uuid,
        dimension: UsageDimension,
        amount: i64,
    ) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner.decrement_usage(tenant_id, dimension, amount).await
    }

    async fn reset_usage(
        &self,
        tenant_id: Uuid,
        dimension: UsageDimension,
    ) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner.reset_usage(tenant_id, dimension).await
    }

    async fn record_payment(
        &self,
        tenant_id: Uuid,
        payment: &PaymentRecord,
    ) -> Result<Subscription, AppError> {
        self.write(tenant_id)?;
        self.inner.record_payment(tenant_id, payment).await
    }

    async fn stats(&self) -> Result<SubscriptionStats, AppError> {
        self.inner.stats().await
    }

    async fn list(&self, filter: &ListSubscriptionsFilter) -> Result<SubscriptionPage, AppError> {
        self.inner.list(filter).await
    }

    async fn find_expiring_trials(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, AppError> {
        self.inner.find_expiring_trials(from, until).await
    }

    async fn find_failed_payments(
        &self,
        min_failures: i32,
    ) -> Result<Vec<Subscription>, AppError> {
        self.inner.find_failed_payments(min_failures).await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, AppError> {
        self.inner.find_expired(now).await
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(AppError::ServiceUnavailable);
        }
        self.inner.health_check().await
    }
}

/// Notice sent by the service, as (kind, tenant).
pub type Notice = (&'static str, Uuid);

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    fn push(&self, kind: &'static str, subscription: &Subscription) {
        self.notices
            .lock()
            .unwrap()
            .push((kind, subscription.tenant_id));
    }
}

#[async_trait]
impl SubscriptionNotifier for RecordingNotifier {
    async fn trial_expiring(
        &self,
        subscription: &Subscription,
        _days_remaining: i64,
    ) -> Result<(), AppError> {
        self.push("trial_expiring", subscription);
        Ok(())
    }

    async fn payment_failed(&self, subscription: &Subscription) -> Result<(), AppError> {
        self.push("payment_failed", subscription);
        Ok(())
    }

    async fn subscription_suspended(
        &self,
        subscription: &Subscription,
        _reason: &str,
    ) -> Result<(), AppError> {
        self.push("subscription_suspended", subscription);
        Ok(())
    }

    async fn trial_converted_to_free(&self, subscription: &Subscription) -> Result<(), AppError> {
        self.push("trial_converted_to_free", subscription);
        Ok(())
    }
}
