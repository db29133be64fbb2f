//! Subscription service: the operations exposed to the transport layer.
//!
//! Each concern gets its own trait; [`SubscriptionManager`] implements all of
//! them over an injected repository and notifier.

mod analytics;
mod lifecycle;
mod sweeps;
mod usage;

use crate::config::BillingSettings;
use crate::dtos::{
    BillingIntervalChangeResponse, CancelSubscriptionRequest, ChangePlanRequest,
    ChangePlanResponse, CreateSubscriptionRequest, FeatureAccessResponse, LimitCheckResponse,
    ListSubscriptionsResponse, RecordPaymentRequest, StartTrialRequest, SubscriptionResponse,
    SuspendSubscriptionRequest, UpdateBillingIntervalRequest, UpdateSubscriptionRequest,
    UpdateUsageRequest, UsageResponse,
};
use crate::models::{
    BillingPreview, Feature, ListSubscriptionsFilter, PlanChange, RevenueMetrics, Subscription,
    SubscriptionStats, SweepKind, SweepReport,
};
use crate::services::metrics;
use crate::services::notifier::SubscriptionNotifier;
use crate::services::repository::SubscriptionRepository;
use async_trait::async_trait;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait SubscriptionLifecycle: Send + Sync {
    async fn create_subscription(
        &self,
        tenant_id: Uuid,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionResponse, AppError>;

    async fn get_subscription(&self, tenant_id: Uuid) -> Result<SubscriptionResponse, AppError>;

    async fn update_subscription(
        &self,
        tenant_id: Uuid,
        request: UpdateSubscriptionRequest,
    ) -> Result<SubscriptionResponse, AppError>;

    async fn delete_subscription(&self, tenant_id: Uuid) -> Result<(), AppError>;

    async fn change_plan(
        &self,
        tenant_id: Uuid,
        request: ChangePlanRequest,
    ) -> Result<ChangePlanResponse, AppError>;

    /// Same checks as [`change_plan`](Self::change_plan), nothing written.
    async fn preview_plan_change(
        &self,
        tenant_id: Uuid,
        request: ChangePlanRequest,
    ) -> Result<BillingPreview, AppError>;

    async fn start_trial(
        &self,
        tenant_id: Uuid,
        request: StartTrialRequest,
    ) -> Result<SubscriptionResponse, AppError>;

    async fn end_trial(
        &self,
        tenant_id: Uuid,
        requested_by: Option<Uuid>,
    ) -> Result<SubscriptionResponse, AppError>;

    async fn cancel_subscription(
        &self,
        tenant_id: Uuid,
        request: CancelSubscriptionRequest,
    ) -> Result<SubscriptionResponse, AppError>;

    async fn reactivate_subscription(
        &self,
        tenant_id: Uuid,
        requested_by: Option<Uuid>,
    ) -> Result<SubscriptionResponse, AppError>;

    async fn suspend_subscription(
        &self,
        tenant_id: Uuid,
        request: SuspendSubscriptionRequest,
    ) -> Result<SubscriptionResponse, AppError>;

    async fn update_billing_interval(
        &self,
        tenant_id: Uuid,
        request: UpdateBillingIntervalRequest,
    ) -> Result<BillingIntervalChangeResponse, AppError>;

    async fn record_payment(
        &self,
        tenant_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<SubscriptionResponse, AppError>;
}

#[async_trait]
pub trait UsageTracking: Send + Sync {
    async fn get_usage(&self, tenant_id: Uuid) -> Result<UsageResponse, AppError>;

    async fn update_usage(
        &self,
        tenant_id: Uuid,
        request: UpdateUsageRequest,
    ) -> Result<UsageResponse, AppError>;

    async fn check_limits(&self, tenant_id: Uuid) -> Result<LimitCheckResponse, AppError>;

    /// `AppError::LimitExceeded` naming every dimension over its limit.
    async fn enforce_limits(&self, tenant_id: Uuid) -> Result<(), AppError>;

    async fn reset_monthly_usage(&self, tenant_id: Uuid) -> Result<UsageResponse, AppError>;

    async fn get_features(&self, tenant_id: Uuid) -> Result<FeatureAccessResponse, AppError>;

    async fn has_feature(&self, tenant_id: Uuid, feature: Feature) -> Result<bool, AppError>;
}

/// Batch scans run on an external schedule. Safe to re-run.
#[async_trait]
pub trait SubscriptionSweeps: Send + Sync {
    async fn process_expiring_trials(&self) -> Result<SweepReport, AppError>;

    async fn process_failed_payments(&self) -> Result<SweepReport, AppError>;

    async fn process_expired_subscriptions(&self) -> Result<SweepReport, AppError>;

    async fn run_sweep(&self, kind: SweepKind) -> Result<SweepReport, AppError> {
        match kind {
            SweepKind::ExpiringTrials => self.process_expiring_trials().await,
            SweepKind::FailedPayments => self.process_failed_payments().await,
            SweepKind::ExpiredSubscriptions => self.process_expired_subscriptions().await,
        }
    }
}

#[async_trait]
pub trait SubscriptionAnalytics: Send + Sync {
    async fn get_stats(&self) -> Result<SubscriptionStats, AppError>;

    async fn get_revenue_metrics(&self) -> Result<RevenueMetrics, AppError>;

    async fn list_subscriptions(
        &self,
        filter: ListSubscriptionsFilter,
    ) -> Result<ListSubscriptionsResponse, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Everything the transport layer needs, behind one object.
pub trait SubscriptionService:
    SubscriptionLifecycle + UsageTracking + SubscriptionSweeps + SubscriptionAnalytics
{
}

impl<T> SubscriptionService for T where
    T: SubscriptionLifecycle + UsageTracking + SubscriptionSweeps + SubscriptionAnalytics
{
}

#[derive(Clone)]
pub struct SubscriptionManager {
    repository: Arc<dyn SubscriptionRepository>,
    notifier: Arc<dyn SubscriptionNotifier>,
    settings: BillingSettings,
}

impl SubscriptionManager {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        notifier: Arc<dyn SubscriptionNotifier>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            repository,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &BillingSettings {
        &self.settings
    }

    /// Fetch the tenant's subscription or `NotFound`.
    async fn load(&self, tenant_id: Uuid, code: &'static str) -> Result<Subscription, AppError> {
        self.repository
            .get_by_tenant(tenant_id)
            .await
            .map_err(repository_error(code))?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Subscription not found for tenant {}",
                    tenant_id
                ))
            })
    }

    /// Record the last modifier. Failure is logged and ignored.
    async fn touch(&self, tenant_id: Uuid, actor: Option<Uuid>) {
        let Some(actor) = actor else {
            return;
        };

        if let Err(e) = self.repository.touch(tenant_id, actor).await {
            tracing::warn!(
                tenant_id = %tenant_id,
                actor = %actor,
                error = %e,
                "Failed to record last modifier"
            );
        }
    }
}

/// Wrap a repository failure with an operation code. `NotFound` and
/// `Conflict` pass through unchanged.
fn repository_error(code: &'static str) -> impl FnOnce(AppError) -> AppError {
    move |err| match err {
        AppError::NotFound(_) | AppError::Conflict(_) => err,
        err => {
            tracing::error!(code = code, error = %err, "Repository call failed");
            metrics::record_error(err.kind(), code);
            AppError::service(code, err)
        }
    }
}

/// Overwrite plan-derived fields in one step.
fn apply_plan(subscription: &mut Subscription, change: &PlanChange) {
    subscription.plan = change.plan;
    subscription.billing_interval = change.billing_interval;
    subscription.amount = change.amount;
    subscription.limits = change.limits;
    subscription.features = change.features;
    subscription.pending_plan = None;
    subscription.pending_interval = None;
    subscription.pending_plan_effective = None;
}
