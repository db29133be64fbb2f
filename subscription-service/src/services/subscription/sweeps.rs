use super::{apply_plan, repository_error, SubscriptionManager, SubscriptionSweeps};
use crate::models::{
    PlanTier, Subscription, SubscriptionStatus, SweepAction, SweepKind, SweepReport,
};
use crate::services::{catalog, metrics};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use tracing::{info, instrument, warn};

const FAILED_PAYMENT_REASON: &str = "Too many failed payments";
const EXPIRED_REASON: &str = "Expired subscription";

/// Whole days left before `end`, counting a partial day as one.
fn days_until(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (end - now).num_seconds();
    if seconds <= 0 {
        return 0;
    }
    (seconds + 86_399) / 86_400
}

impl SubscriptionManager {
    fn record_outcome(
        report: &mut SweepReport,
        subscription: &Subscription,
        outcome: Result<SweepAction, AppError>,
    ) {
        let kind = report.kind;
        match outcome {
            Ok(action) => {
                metrics::record_sweep_item(kind.as_str(), action.as_str());
                report.record_success(subscription.tenant_id, subscription.subscription_id, action);
            }
            Err(e) => {
                warn!(
                    sweep = %kind,
                    tenant_id = %subscription.tenant_id,
                    subscription_id = %subscription.subscription_id,
                    error = %e,
                    "Sweep item failed, continuing"
                );
                metrics::record_sweep_item(kind.as_str(), SweepAction::Failed.as_str());
                report.record_failure(
                    subscription.tenant_id,
                    subscription.subscription_id,
                    e.to_string(),
                );
            }
        }
    }

    fn finish_sweep(report: SweepReport) -> SweepReport {
        let report = report.finish();
        info!(
            sweep = %report.kind,
            processed = report.subscriptions_processed,
            succeeded = report.subscriptions_succeeded,
            failed = report.subscriptions_failed,
            "Sweep completed"
        );
        report
    }

    /// Notice delivery never fails the item once the state change is stored.
    async fn notify_suspended(&self, subscription: &Subscription, reason: &str) {
        if let Err(e) = self
            .notifier
            .subscription_suspended(subscription, reason)
            .await
        {
            warn!(tenant_id = %subscription.tenant_id, error = %e, "Suspension notice failed");
        }
    }

    async fn handle_failed_payment(
        &self,
        subscription: &Subscription,
    ) -> Result<SweepAction, AppError> {
        if subscription.failed_payment_count >= self.settings.failed_payment_threshold {
            let suspended = self
                .repository
                .suspend(subscription.tenant_id, FAILED_PAYMENT_REASON)
                .await
                .map_err(repository_error("SWEEP_SUSPEND_FAILED"))?;
            self.notify_suspended(&suspended, FAILED_PAYMENT_REASON).await;
            info!(
                tenant_id = %subscription.tenant_id,
                failed_payments = subscription.failed_payment_count,
                "Subscription suspended for failed payments"
            );
            Ok(SweepAction::Suspended)
        } else {
            self.notifier.payment_failed(subscription).await?;
            Ok(SweepAction::Reminded)
        }
    }

    async fn handle_expired(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<SweepAction, AppError> {
        if subscription.status != SubscriptionStatus::Trialing {
            let suspended = self
                .repository
                .suspend(subscription.tenant_id, EXPIRED_REASON)
                .await
                .map_err(repository_error("SWEEP_SUSPEND_FAILED"))?;
            self.notify_suspended(&suspended, EXPIRED_REASON).await;
            info!(tenant_id = %subscription.tenant_id, "Expired subscription suspended");
            return Ok(SweepAction::Suspended);
        }

        // Lapsed trials fall back to the free plan instead of being locked out.
        let mut converted = subscription.clone();
        let interval = converted.billing_interval;
        apply_plan(&mut converted, &catalog::plan_change(PlanTier::Free, interval));
        converted.status = SubscriptionStatus::Active;
        converted.trial_end = None;
        converted.current_period_start = now;
        converted.current_period_end = catalog::calculate_period_end(now, PlanTier::Free, interval);
        converted.next_billing_date = None;

        let stored = self
            .repository
            .update(&converted)
            .await
            .map_err(repository_error("SWEEP_TRIAL_CONVERSION_FAILED"))?;

        if let Err(e) = self.notifier.trial_converted_to_free(&stored).await {
            warn!(tenant_id = %stored.tenant_id, error = %e, "Trial conversion notice failed");
        }
        info!(
            tenant_id = %subscription.tenant_id,
            previous_plan = %subscription.plan,
            "Expired trial moved to free plan"
        );
        Ok(SweepAction::ConvertedToFree)
    }
}

#[async_trait]
impl SubscriptionSweeps for SubscriptionManager {
    #[instrument(skip(self))]
    async fn process_expiring_trials(&self) -> Result<SweepReport, AppError> {
        let kind = SweepKind::ExpiringTrials;
        metrics::record_sweep_run(kind.as_str());

        let now = Utc::now();
        let until = now + Duration::days(self.settings.trial_expiry_horizon_days);
        let trials = self
            .repository
            .find_expiring_trials(now, until)
            .await
            .map_err(repository_error("SWEEP_EXPIRING_TRIALS_FAILED"))?;

        info!(sweep = %kind, candidates = trials.len(), "Sweep started");
        let mut report = SweepReport::start(kind);

        for subscription in &trials {
            let days_remaining = subscription
                .trial_end
                .map(|end| days_until(end, now))
                .unwrap_or(0);

            let outcome = self
                .notifier
                .trial_expiring(subscription, days_remaining)
                .await
                .map(|_| SweepAction::Notified);
            Self::record_outcome(&mut report, subscription, outcome);
        }

        Ok(Self::finish_sweep(report))
    }

    #[instrument(skip(self))]
    async fn process_failed_payments(&self) -> Result<SweepReport, AppError> {
        let kind = SweepKind::FailedPayments;
        metrics::record_sweep_run(kind.as_str());

        let candidates = self
            .repository
            .find_failed_payments(1)
            .await
            .map_err(repository_error("SWEEP_FAILED_PAYMENTS_FAILED"))?;

        info!(sweep = %kind, candidates = candidates.len(), "Sweep started");
        let mut report = SweepReport::start(kind);

        for subscription in &candidates {
            let outcome = self.handle_failed_payment(subscription).await;
            Self::record_outcome(&mut report, subscription, outcome);
        }

        Ok(Self::finish_sweep(report))
    }

    #[instrument(skip(self))]
    async fn process_expired_subscriptions(&self) -> Result<SweepReport, AppError> {
        let kind = SweepKind::ExpiredSubscriptions;
        metrics::record_sweep_run(kind.as_str());

        let now = Utc::now();
        let expired = self
            .repository
            .find_expired(now)
            .await
            .map_err(repository_error("SWEEP_EXPIRED_SUBSCRIPTIONS_FAILED"))?;

        info!(sweep = %kind, candidates = expired.len(), "Sweep started");
        let mut report = SweepReport::start(kind);

        for subscription in &expired {
            let outcome = self.handle_expired(subscription, now).await;
            Self::record_outcome(&mut report, subscription, outcome);
        }

        Ok(Self::finish_sweep(report))
    }
}
