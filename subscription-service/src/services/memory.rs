//! In-process subscription store.
//!
//! Backs the binary in standalone mode and the test suite. Each tenant maps to
//! at most one subscription; every write replaces the whole record under the
//! map's shard lock, so a single call is atomic with respect to other calls.

use crate::models::{
    BillingInterval, BillingPeriod, ListSubscriptionsFilter, PaymentRecord, PlanChange,
    Subscription, SubscriptionPage, SubscriptionStats, SubscriptionStatus, UsageDimension,
};
use crate::services::catalog;
use crate::services::metrics::REPOSITORY_CALL_DURATION;
use crate::services::repository::SubscriptionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::BTreeMap;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Subscriptions keyed by tenant id.
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: DashMap<Uuid, Subscription>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    fn mutate<F>(&self, operation: &str, tenant_id: Uuid, f: F) -> Result<Subscription, AppError>
    where
        F: FnOnce(&mut Subscription),
    {
        let timer = REPOSITORY_CALL_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let mut entry = self.subscriptions.get_mut(&tenant_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Subscription not found for tenant {}",
                tenant_id
            ))
        })?;

        f(entry.value_mut());
        entry.updated_utc = Utc::now();

        timer.observe_duration();
        debug!(tenant_id = %tenant_id, operation = operation, "Subscription written");

        Ok(entry.value().clone())
    }

    fn scan<F>(&self, operation: &str, predicate: F) -> Vec<Subscription>
    where
        F: Fn(&Subscription) -> bool,
    {
        let timer = REPOSITORY_CALL_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let mut found: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|s| s.subscription_id);

        timer.observe_duration();
        found
    }
}

/// Monthly revenue contributed by one subscription, net of discount.
fn monthly_revenue(subscription: &Subscription) -> Decimal {
    if !subscription.status.is_billable() {
        return Decimal::ZERO;
    }

    let gross = match subscription.billing_interval {
        BillingInterval::Monthly => subscription.amount,
        BillingInterval::Yearly => subscription.amount / Decimal::from(12),
        BillingInterval::Lifetime => Decimal::ZERO,
    };

    gross * (Decimal::ONE_HUNDRED - subscription.discount_percent) / Decimal::ONE_HUNDRED
}

/// Apply a plan change now. Period bounds stay put; the next billing date
/// follows whether the new plan still renews, except during a trial.
fn apply_change(s: &mut Subscription, change: &PlanChange) {
    s.plan = change.plan;
    s.billing_interval = change.billing_interval;
    s.amount = change.amount;
    s.limits = change.limits;
    s.features = change.features;
    s.pending_plan = None;
    s.pending_interval = None;
    s.pending_plan_effective = None;
    if s.status != SubscriptionStatus::Trialing {
        s.next_billing_date = catalog::is_recurring(change.plan, change.billing_interval)
            .then_some(s.current_period_end);
    }
}

fn is_live(status: SubscriptionStatus) -> bool {
    !matches!(
        status,
        SubscriptionStatus::Suspended | SubscriptionStatus::Canceled
    )
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    #[instrument(skip(self))]
    async fn get_by_tenant(&self, tenant_id: Uuid) -> Result<Option<Subscription>, AppError> {
        let timer = REPOSITORY_CALL_DURATION
            .with_label_values(&["get_by_tenant"])
            .start_timer();

        let subscription = self
            .subscriptions
            .get(&tenant_id)
            .map(|entry| entry.value().clone());

        timer.observe_duration();
        Ok(subscription)
    }

    #[instrument(skip(self, subscription), fields(tenant_id = %subscription.tenant_id))]
    async fn create(&self, subscription: &Subscription) -> Result<Subscription, AppError> {
        let timer = REPOSITORY_CALL_DURATION
            .with_label_values(&["create"])
            .start_timer();

        let result = match self.subscriptions.entry(subscription.tenant_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(anyhow::anyhow!(
                "Tenant {} already has a subscription",
                subscription.tenant_id
            ))),
            Entry::Vacant(slot) => Ok(slot.insert(subscription.clone()).value().clone()),
        };

        timer.observe_duration();
        result
    }

    #[instrument(skip(self, subscription), fields(tenant_id = %subscription.tenant_id))]
    async fn update(&self, subscription: &Subscription) -> Result<Subscription, AppError> {
        let replacement = subscription.clone();
        self.mutate("update", subscription.tenant_id, move |stored| {
            *stored = replacement;
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, tenant_id: Uuid) -> Result<bool, AppError> {
        let timer = REPOSITORY_CALL_DURATION
            .with_label_values(&["delete"])
            .start_timer();

        let removed = self.subscriptions.remove(&tenant_id).is_some();

        timer.observe_duration();
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn touch(&self, tenant_id: Uuid, modified_by: Uuid) -> Result<(), AppError> {
        self.mutate("touch", tenant_id, |s| s.updated_by = Some(modified_by))
            .map(|_| ())
    }

    #[instrument(skip(self, change), fields(plan = %change.plan))]
    async fn upgrade_plan(
        &self,
        tenant_id: Uuid,
        change: &PlanChange,
    ) -> Result<Subscription, AppError> {
        self.mutate("upgrade_plan", tenant_id, |s| {
            apply_change(s, change);
        })
    }

    #[instrument(skip(self, change), fields(plan = %change.plan))]
    async fn downgrade_plan(
        &self,
        tenant_id: Uuid,
        change: &PlanChange,
        effective_immediately: bool,
        effective_at: DateTime<Utc>,
    ) -> Result<Subscription, AppError> {
        self.mutate("downgrade_plan", tenant_id, |s| {
            if effective_immediately {
                apply_change(s, change);
            } else {
                s.pending_plan = Some(change.plan);
                s.pending_interval = Some(change.billing_interval);
                s.pending_plan_effective = Some(effective_at);
            }
        })
    }

    #[instrument(skip(self))]
    async fn start_trial(
        &self,
        tenant_id: Uuid,
        period: BillingPeriod,
    ) -> Result<Subscription, AppError> {
        self.mutate("start_trial", tenant_id, |s| {
            s.status = SubscriptionStatus::Trialing;
            s.current_period_start = period.start;
            s.current_period_end = period.end;
            s.trial_end = Some(period.end);
            s.next_billing_date = Some(period.end);
        })
    }

    #[instrument(skip(self))]
    async fn end_trial(
        &self,
        tenant_id: Uuid,
        period: BillingPeriod,
    ) -> Result<Subscription, AppError> {
        self.mutate("end_trial", tenant_id, |s| {
            s.status = SubscriptionStatus::Active;
            s.current_period_start = period.start;
            s.current_period_end = period.end;
            s.next_billing_date =
                catalog::is_recurring(s.plan, s.billing_interval).then_some(period.end);
            s.trial_end = None;
        })
    }

    #[instrument(skip(self, reason))]
    async fn cancel(
        &self,
        tenant_id: Uuid,
        reason: Option<String>,
        at_period_end: bool,
    ) -> Result<Subscription, AppError> {
        self.mutate("cancel", tenant_id, |s| {
            s.cancellation_reason = reason;
            if at_period_end {
                s.cancel_at_period_end = true;
            } else {
                s.status = SubscriptionStatus::Canceled;
                s.cancel_at_period_end = false;
                s.canceled_at = Some(Utc::now());
                s.next_billing_date = None;
                s.trial_end = None;
            }
        })
    }

    #[instrument(skip(self))]
    async fn reactivate(
        &self,
        tenant_id: Uuid,
        period: BillingPeriod,
    ) -> Result<Subscription, AppError> {
        self.mutate("reactivate", tenant_id, |s| {
            s.status = SubscriptionStatus::Active;
            s.current_period_start = period.start;
            s.current_period_end = period.end;
            s.next_billing_date =
                catalog::is_recurring(s.plan, s.billing_interval).then_some(period.end);
            s.trial_end = None;
            s.cancel_at_period_end = false;
            s.canceled_at = None;
            s.cancellation_reason = None;
            s.suspended_at = None;
            s.suspension_reason = None;
            s.failed_payment_count = 0;
        })
    }

    #[instrument(skip(self))]
    async fn suspend(&self, tenant_id: Uuid, reason: &str) -> Result<Subscription, AppError> {
        self.mutate("suspend", tenant_id, |s| {
            s.status = SubscriptionStatus::Suspended;
            s.suspended_at = Some(Utc::now());
            s.suspension_reason = Some(reason.to_string());
            s.trial_end = None;
        })
    }

    #[instrument(skip(self))]
    async fn increment_usage(
        &self,
        tenant_id: Uuid,
        dimension: UsageDimension,
        amount: i64,
    ) -> Result<Subscription, AppError> {
        self.mutate("increment_usage", tenant_id, |s| {
            s.usage.increment(dimension, amount)
        })
    }

    #[instrument(skip(self))]
    async fn decrement_usage(
        &self,
        tenant_id: Uuid,
        dimension: UsageDimension,
        amount: i64,
    ) -> Result<Subscription, AppError> {
        self.mutate("decrement_usage", tenant_id, |s| {
            s.usage.decrement(dimension, amount)
        })
    }

    #[instrument(skip(self))]
    async fn reset_usage(
        &self,
        tenant_id: Uuid,
        dimension: UsageDimension,
    ) -> Result<Subscription, AppError> {
        self.mutate("reset_usage", tenant_id, |s| s.usage.reset(dimension))
    }

    #[instrument(skip(self, payment), fields(succeeded = payment.succeeded))]
    async fn record_payment(
        &self,
        tenant_id: Uuid,
        payment: &PaymentRecord,
    ) -> Result<Subscription, AppError> {
        self.mutate("record_payment", tenant_id, |s| {
            if payment.succeeded {
                s.failed_payment_count = 0;
                s.last_payment_at = Some(payment.recorded_at);
                s.last_payment_amount = Some(payment.amount);
            } else {
                s.failed_payment_count = s.failed_payment_count.saturating_add(1);
            }
        })
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<SubscriptionStats, AppError> {
        let all = self.scan("stats", |_| true);

        let mut by_plan: BTreeMap<String, i64> = BTreeMap::new();
        let mut by_status: BTreeMap<String, i64> = BTreeMap::new();
        let mut revenue_by_plan: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut mrr = Decimal::ZERO;
        let mut canceled = 0i64;

        for s in &all {
            *by_plan.entry(s.plan.as_str().to_string()).or_default() += 1;
            *by_status.entry(s.status.as_str().to_string()).or_default() += 1;

            let revenue = monthly_revenue(s);
            *revenue_by_plan.entry(s.plan.as_str().to_string()).or_default() += revenue;
            mrr += revenue;

            if s.status == SubscriptionStatus::Canceled {
                canceled += 1;
            }
        }

        let total = all.len() as i64;
        let churn_rate = if total > 0 {
            (Decimal::from(canceled) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        let mrr = mrr.round_dp(2);
        Ok(SubscriptionStats {
            total,
            by_plan,
            by_status,
            arr: mrr * Decimal::from(12),
            mrr,
            churn_rate,
            revenue_by_plan: revenue_by_plan
                .into_iter()
                .map(|(plan, revenue)| (plan, revenue.round_dp(2)))
                .collect(),
        })
    }

    #[instrument(skip(self, filter))]
    async fn list(&self, filter: &ListSubscriptionsFilter) -> Result<SubscriptionPage, AppError> {
        let limit = filter.page_size.clamp(1, 100) as usize;

        let matching = self.scan("list", |s| {
            filter.plan.is_none_or(|p| s.plan == p)
                && filter.status.is_none_or(|st| s.status == st)
                && filter.billing_interval.is_none_or(|i| s.billing_interval == i)
                && filter.page_token.is_none_or(|cursor| s.subscription_id > cursor)
        });

        let subscriptions: Vec<Subscription> = matching.into_iter().take(limit).collect();
        let next_page_token = if subscriptions.len() == limit {
            subscriptions.last().map(|s| s.subscription_id)
        } else {
            None
        };

        Ok(SubscriptionPage {
            subscriptions,
            next_page_token,
        })
    }

    #[instrument(skip(self))]
    async fn find_expiring_trials(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, AppError> {
        Ok(self.scan("find_expiring_trials", |s| {
            s.status == SubscriptionStatus::Trialing
                && s.trial_end.is_some_and(|end| end >= from && end <= until)
        }))
    }

    #[instrument(skip(self))]
    async fn find_failed_payments(
        &self,
        min_failures: i32,
    ) -> Result<Vec<Subscription>, AppError> {
        Ok(self.scan("find_failed_payments", |s| {
            s.status.is_billable() && s.failed_payment_count >= min_failures
        }))
    }

    #[instrument(skip(self))]
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, AppError> {
        Ok(self.scan("find_expired", |s| is_live(s.status) && s.is_expired_at(now)))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
