//! Data-access collaborator consumed by the subscription service.

use crate::models::{
    BillingPeriod, ListSubscriptionsFilter, PaymentRecord, PlanChange, Subscription,
    SubscriptionPage, SubscriptionStats, UsageDimension,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

/// Persistence operations for tenant subscriptions.
///
/// Mutations return the stored subscription after the write. Operations on a
/// tenant without a subscription return `AppError::NotFound`.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn get_by_tenant(&self, tenant_id: Uuid) -> Result<Option<Subscription>, AppError>;

    /// Insert a new subscription; `AppError::Conflict` if the tenant has one.
    async fn create(&self, subscription: &Subscription) -> Result<Subscription, AppError>;

    /// Replace the stored subscription for `subscription.tenant_id`.
    async fn update(&self, subscription: &Subscription) -> Result<Subscription, AppError>;

    /// Hard delete. Returns false when nothing was stored.
    async fn delete(&self, tenant_id: Uuid) -> Result<bool, AppError>;

    /// Record who last modified the subscription.
    async fn touch(&self, tenant_id: Uuid, modified_by: Uuid) -> Result<(), AppError>;

    /// Apply a higher plan immediately.
    async fn upgrade_plan(&self, tenant_id: Uuid, change: &PlanChange)
    -> Result<Subscription, AppError>;

    /// Apply a lower plan now, or schedule it (plan and interval) for
    /// `effective_at` when `effective_immediately` is false.
    async fn downgrade_plan(
        &self,
        tenant_id: Uuid,
        change: &PlanChange,
        effective_immediately: bool,
        effective_at: DateTime<Utc>,
    ) -> Result<Subscription, AppError>;

    /// Enter `Trialing` with the trial covering the whole period.
    async fn start_trial(
        &self,
        tenant_id: Uuid,
        period: BillingPeriod,
    ) -> Result<Subscription, AppError>;

    /// Leave `Trialing` for `Active` with a fresh paid period.
    async fn end_trial(&self, tenant_id: Uuid, period: BillingPeriod)
    -> Result<Subscription, AppError>;

    async fn cancel(
        &self,
        tenant_id: Uuid,
        reason: Option<String>,
        at_period_end: bool,
    ) -> Result<Subscription, AppError>;

    async fn reactivate(&self, tenant_id: Uuid, period: BillingPeriod)
    -> Result<Subscription, AppError>;

    async fn suspend(&self, tenant_id: Uuid, reason: &str) -> Result<Subscription, AppError>;

    async fn increment_usage(
        &self,
        tenant_id: Uuid,
        dimension: UsageDimension,
        amount: i64,
    ) -> Result<Subscription, AppError>;

    /// Decrease a counter, clamping at zero.
    async fn decrement_usage(
        &self,
        tenant_id: Uuid,
        dimension: UsageDimension,
        amount: i64,
    ) -> Result<Subscription, AppError>;

    async fn reset_usage(
        &self,
        tenant_id: Uuid,
        dimension: UsageDimension,
    ) -> Result<Subscription, AppError>;

    /// Record a payment outcome: success clears the consecutive failure
    /// count, failure increments it.
    async fn record_payment(
        &self,
        tenant_id: Uuid,
        payment: &PaymentRecord,
    ) -> Result<Subscription, AppError>;

    async fn stats(&self) -> Result<SubscriptionStats, AppError>;

    async fn list(&self, filter: &ListSubscriptionsFilter) -> Result<SubscriptionPage, AppError>;

    /// Trialing subscriptions whose trial ends within `[from, until]`.
    async fn find_expiring_trials(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, AppError>;

    /// Active or past-due subscriptions with at least `min_failures`
    /// consecutive failed payments.
    async fn find_failed_payments(&self, min_failures: i32)
    -> Result<Vec<Subscription>, AppError>;

    /// Live subscriptions whose current period ended before `now`.
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}
