use super::{apply_plan, repository_error, SubscriptionLifecycle, SubscriptionManager};
use crate::dtos::{
    BillingIntervalChangeResponse, CancelSubscriptionRequest, ChangePlanRequest,
    ChangePlanResponse, CreateSubscriptionRequest, RecordPaymentRequest, StartTrialRequest,
    SubscriptionResponse, SuspendSubscriptionRequest, UpdateBillingIntervalRequest,
    UpdateSubscriptionRequest,
};
use crate::models::{
    BillingInterval, BillingPeriod, BillingPreview, PaymentRecord, PlanTier, Subscription,
    SubscriptionStatus, UsageCounters,
};
use crate::services::{billing, catalog, metrics};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

fn validate_discount(discount: Option<Decimal>) -> Result<(), AppError> {
    match discount {
        Some(d) if d < Decimal::ZERO || d > Decimal::ONE_HUNDRED => Err(AppError::BadRequest(
            anyhow::anyhow!("Discount must be between 0 and 100 percent"),
        )),
        _ => Ok(()),
    }
}

fn ensure_listed(plan: PlanTier, interval: BillingInterval) -> Result<(), AppError> {
    if catalog::is_listed(plan, interval) {
        Ok(())
    } else {
        Err(AppError::BadRequest(anyhow::anyhow!(
            "Plan {} is not offered with {} billing",
            plan,
            interval
        )))
    }
}

/// Plan changes are only possible on a live subscription.
fn ensure_changeable(subscription: &Subscription) -> Result<(), AppError> {
    match subscription.status {
        SubscriptionStatus::Canceled | SubscriptionStatus::Suspended => {
            Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot change a {} subscription",
                subscription.status
            )))
        }
        _ => Ok(()),
    }
}

fn fresh_period(now: DateTime<Utc>, plan: PlanTier, interval: BillingInterval) -> BillingPeriod {
    BillingPeriod {
        start: now,
        end: catalog::calculate_period_end(now, plan, interval),
    }
}

/// Validated plan change: the target, whether it is an upgrade and whether
/// it applies now.
struct PlannedChange {
    new_plan: PlanTier,
    new_interval: BillingInterval,
    is_upgrade: bool,
    immediate: bool,
}

fn plan_change_for(
    subscription: &Subscription,
    request: &ChangePlanRequest,
) -> Result<PlannedChange, AppError> {
    ensure_changeable(subscription)?;

    if request.new_plan == subscription.plan {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Subscription is already on the {} plan",
            subscription.plan
        )));
    }

    let new_interval = request
        .billing_interval
        .unwrap_or(subscription.billing_interval);
    ensure_listed(request.new_plan, new_interval)?;

    let is_upgrade = catalog::is_plan_upgrade(subscription.plan, request.new_plan);

    Ok(PlannedChange {
        new_plan: request.new_plan,
        new_interval,
        is_upgrade,
        // Upgrades never wait for the period end.
        immediate: is_upgrade || request.change_immediately,
    })
}

#[async_trait]
impl SubscriptionLifecycle for SubscriptionManager {
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, plan = %request.plan))]
    async fn create_subscription(
        &self,
        tenant_id: Uuid,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionResponse, AppError> {
        const CODE: &str = "SUBSCRIPTION_CREATE_FAILED";

        request.validate()?;
        validate_discount(request.discount_percent)?;
        ensure_listed(request.plan, request.billing_interval)?;
        if request.trial_days > self.settings.max_trial_days {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Trial cannot exceed {} days",
                self.settings.max_trial_days
            )));
        }

        let existing = self
            .repository
            .get_by_tenant(tenant_id)
            .await
            .map_err(repository_error(CODE))?;
        if existing.is_some() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Tenant {} already has a subscription",
                tenant_id
            )));
        }

        let now = Utc::now();
        let plan = request.plan;
        let interval = request.billing_interval;
        let on_trial = request.trial_days > 0 && plan != PlanTier::Free;

        let (status, period_end, trial_end) = if on_trial {
            let end = now + Duration::days(i64::from(request.trial_days));
            (SubscriptionStatus::Trialing, end, Some(end))
        } else {
            (
                SubscriptionStatus::Active,
                catalog::calculate_period_end(now, plan, interval),
                None,
            )
        };

        let next_billing_date =
            (on_trial || catalog::is_recurring(plan, interval)).then_some(period_end);

        let subscription = Subscription {
            subscription_id: Uuid::new_v4(),
            tenant_id,
            plan,
            status,
            billing_interval: interval,
            amount: catalog::plan_price(plan, interval),
            currency: request
                .currency
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| self.settings.default_currency.clone()),
            discount_percent: request.discount_percent.unwrap_or(Decimal::ZERO),
            current_period_start: now,
            current_period_end: period_end,
            next_billing_date,
            trial_end,
            cancel_at_period_end: false,
            canceled_at: None,
            cancellation_reason: None,
            suspended_at: None,
            suspension_reason: None,
            pending_plan: None,
            pending_interval: None,
            pending_plan_effective: None,
            limits: catalog::plan_limits(plan),
            features: catalog::plan_features(plan),
            usage: UsageCounters::default(),
            failed_payment_count: 0,
            last_payment_at: None,
            last_payment_amount: None,
            external_customer_id: request.external_customer_id,
            external_subscription_id: None,
            metadata: request.metadata,
            updated_by: request.created_by,
            created_utc: now,
            updated_utc: now,
        };

        let created = self
            .repository
            .create(&subscription)
            .await
            .map_err(repository_error(CODE))?;

        metrics::record_subscription_operation(&tenant_id.to_string(), "create");
        info!(
            tenant_id = %tenant_id,
            subscription_id = %created.subscription_id,
            plan = %created.plan,
            status = %created.status,
            period_end = %created.current_period_end,
            "Subscription created"
        );

        Ok(created.into())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn get_subscription(&self, tenant_id: Uuid) -> Result<SubscriptionResponse, AppError> {
        let subscription = self.load(tenant_id, "SUBSCRIPTION_GET_FAILED").await?;
        debug!(tenant_id = %tenant_id, status = %subscription.status, "Subscription loaded");
        Ok(subscription.into())
    }

    #[instrument(skip(self, request), fields(tenant_id = %tenant_id))]
    async fn update_subscription(
        &self,
        tenant_id: Uuid,
        request: UpdateSubscriptionRequest,
    ) -> Result<SubscriptionResponse, AppError> {
        const CODE: &str = "SUBSCRIPTION_UPDATE_FAILED";

        request.validate()?;
        validate_discount(request.discount_percent)?;

        let mut subscription = self.load(tenant_id, CODE).await?;

        if let Some(currency) = request.currency {
            subscription.currency = currency.to_uppercase();
        }
        if let Some(discount) = request.discount_percent {
            subscription.discount_percent = discount;
        }
        if let Some(id) = request.external_customer_id {
            subscription.external_customer_id = Some(id);
        }
        if let Some(id) = request.external_subscription_id {
            subscription.external_subscription_id = Some(id);
        }
        if let Some(metadata) = request.metadata {
            subscription.metadata = Some(metadata);
        }

        let updated = self
            .repository
            .update(&subscription)
            .await
            .map_err(repository_error(CODE))?;

        self.touch(tenant_id, request.updated_by).await;
        metrics::record_subscription_operation(&tenant_id.to_string(), "update");
        info!(tenant_id = %tenant_id, "Subscription updated");

        Ok(updated.into())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn delete_subscription(&self, tenant_id: Uuid) -> Result<(), AppError> {
        let removed = self
            .repository
            .delete(tenant_id)
            .await
            .map_err(repository_error("SUBSCRIPTION_DELETE_FAILED"))?;

        if !removed {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Subscription not found for tenant {}",
                tenant_id
            )));
        }

        metrics::record_subscription_operation(&tenant_id.to_string(), "delete");
        info!(tenant_id = %tenant_id, "Subscription deleted");
        Ok(())
    }

    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, new_plan = %request.new_plan))]
    async fn change_plan(
        &self,
        tenant_id: Uuid,
        request: ChangePlanRequest,
    ) -> Result<ChangePlanResponse, AppError> {
        const CODE: &str = "PLAN_CHANGE_FAILED";

        request.validate()?;
        let subscription = self.load(tenant_id, CODE).await?;
        let planned = plan_change_for(&subscription, &request)?;

        let now = Utc::now();
        let preview = billing::preview_change(
            &subscription,
            planned.new_plan,
            planned.new_interval,
            planned.immediate,
            now,
        );
        let change = catalog::plan_change(planned.new_plan, planned.new_interval);

        let updated = if planned.is_upgrade {
            self.repository.upgrade_plan(tenant_id, &change).await
        } else {
            self.repository
                .downgrade_plan(
                    tenant_id,
                    &change,
                    planned.immediate,
                    subscription.current_period_end,
                )
                .await
        }
        .map_err(repository_error(CODE))?;

        let direction = if planned.is_upgrade {
            "upgrade"
        } else {
            "downgrade"
        };
        let timing = if planned.immediate {
            "immediate"
        } else {
            "period_end"
        };
        metrics::record_plan_change(direction, timing);
        metrics::record_subscription_operation(&tenant_id.to_string(), "change_plan");

        self.touch(tenant_id, request.requested_by).await;

        info!(
            tenant_id = %tenant_id,
            from_plan = %subscription.plan,
            to_plan = %planned.new_plan,
            direction = direction,
            timing = timing,
            proration = %preview.proration_amount,
            "Plan change processed"
        );

        Ok(ChangePlanResponse {
            subscription: updated.into(),
            preview,
            applied_immediately: planned.immediate,
            scheduled_for: (!planned.immediate).then_some(subscription.current_period_end),
        })
    }

    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, new_plan = %request.new_plan))]
    async fn preview_plan_change(
        &self,
        tenant_id: Uuid,
        request: ChangePlanRequest,
    ) -> Result<BillingPreview, AppError> {
        request.validate()?;
        let subscription = self.load(tenant_id, "PLAN_PREVIEW_FAILED").await?;
        let planned = plan_change_for(&subscription, &request)?;

        Ok(billing::preview_change(
            &subscription,
            planned.new_plan,
            planned.new_interval,
            planned.immediate,
            Utc::now(),
        ))
    }

    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, trial_days = request.trial_days))]
    async fn start_trial(
        &self,
        tenant_id: Uuid,
        request: StartTrialRequest,
    ) -> Result<SubscriptionResponse, AppError> {
        const CODE: &str = "TRIAL_START_FAILED";

        request.validate()?;
        if request.trial_days > self.settings.max_trial_days {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Trial cannot exceed {} days",
                self.settings.max_trial_days
            )));
        }

        let subscription = self.load(tenant_id, CODE).await?;
        match subscription.status {
            SubscriptionStatus::Trialing => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Subscription is already in a trial"
                )));
            }
            SubscriptionStatus::Canceled | SubscriptionStatus::Suspended => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Cannot start a trial on a {} subscription",
                    subscription.status
                )));
            }
            _ => {}
        }
        if subscription.plan == PlanTier::Free {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Trials are only available on paid plans"
            )));
        }

        let now = Utc::now();
        let period = BillingPeriod {
            start: now,
            end: now + Duration::days(i64::from(request.trial_days)),
        };

        let updated = self
            .repository
            .start_trial(tenant_id, period)
            .await
            .map_err(repository_error(CODE))?;

        self.touch(tenant_id, request.requested_by).await;
        metrics::record_subscription_operation(&tenant_id.to_string(), "start_trial");
        info!(tenant_id = %tenant_id, trial_end = %period.end, "Trial started");

        Ok(updated.into())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn end_trial(
        &self,
        tenant_id: Uuid,
        requested_by: Option<Uuid>,
    ) -> Result<SubscriptionResponse, AppError> {
        const CODE: &str = "TRIAL_END_FAILED";

        let subscription = self.load(tenant_id, CODE).await?;
        if subscription.status != SubscriptionStatus::Trialing {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Subscription is not in a trial (status {})",
                subscription.status
            )));
        }

        let period = fresh_period(
            Utc::now(),
            subscription.plan,
            subscription.billing_interval,
        );
        let updated = self
            .repository
            .end_trial(tenant_id, period)
            .await
            .map_err(repository_error(CODE))?;

        self.touch(tenant_id, requested_by).await;
        metrics::record_subscription_operation(&tenant_id.to_string(), "end_trial");
        info!(tenant_id = %tenant_id, period_end = %period.end, "Trial ended, subscription active");

        Ok(updated.into())
    }

    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, at_period_end = request.cancel_at_period_end))]
    async fn cancel_subscription(
        &self,
        tenant_id: Uuid,
        request: CancelSubscriptionRequest,
    ) -> Result<SubscriptionResponse, AppError> {
        const CODE: &str = "SUBSCRIPTION_CANCEL_FAILED";

        request.validate()?;
        let subscription = self.load(tenant_id, CODE).await?;
        if subscription.status == SubscriptionStatus::Canceled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Subscription is already canceled"
            )));
        }

        let updated = self
            .repository
            .cancel(tenant_id, request.reason, request.cancel_at_period_end)
            .await
            .map_err(repository_error(CODE))?;

        self.touch(tenant_id, request.canceled_by).await;
        metrics::record_subscription_operation(&tenant_id.to_string(), "cancel");

        if request.cancel_at_period_end {
            // TODO: have process_expired_subscriptions cancel, rather than
            // suspend, subscriptions flagged cancel_at_period_end.
            warn!(
                tenant_id = %tenant_id,
                period_end = %updated.current_period_end,
                "Cancellation deferred to period end; no sweep enacts it yet"
            );
        } else {
            info!(tenant_id = %tenant_id, "Subscription canceled");
        }

        Ok(updated.into())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn reactivate_subscription(
        &self,
        tenant_id: Uuid,
        requested_by: Option<Uuid>,
    ) -> Result<SubscriptionResponse, AppError> {
        const CODE: &str = "SUBSCRIPTION_REACTIVATE_FAILED";

        let subscription = self.load(tenant_id, CODE).await?;

        let updated = match subscription.status {
            SubscriptionStatus::Canceled | SubscriptionStatus::Suspended => {
                let period = fresh_period(
                    Utc::now(),
                    subscription.plan,
                    subscription.billing_interval,
                );
                self.repository.reactivate(tenant_id, period).await
            }
            _ if subscription.cancel_at_period_end => {
                let mut pending = subscription.clone();
                pending.cancel_at_period_end = false;
                pending.cancellation_reason = None;
                self.repository.update(&pending).await
            }
            status => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Subscription is {} and has no pending cancellation",
                    status
                )));
            }
        }
        .map_err(repository_error(CODE))?;

        self.touch(tenant_id, requested_by).await;
        metrics::record_subscription_operation(&tenant_id.to_string(), "reactivate");
        info!(
            tenant_id = %tenant_id,
            previous_status = %subscription.status,
            "Subscription reactivated"
        );

        Ok(updated.into())
    }

    #[instrument(skip(self, request), fields(tenant_id = %tenant_id))]
    async fn suspend_subscription(
        &self,
        tenant_id: Uuid,
        request: SuspendSubscriptionRequest,
    ) -> Result<SubscriptionResponse, AppError> {
        const CODE: &str = "SUBSCRIPTION_SUSPEND_FAILED";

        request.validate()?;
        let subscription = self.load(tenant_id, CODE).await?;
        if !subscription.status.is_billable() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only active or past-due subscriptions can be suspended (status {})",
                subscription.status
            )));
        }

        let updated = self
            .repository
            .suspend(tenant_id, &request.reason)
            .await
            .map_err(repository_error(CODE))?;

        self.touch(tenant_id, request.suspended_by).await;
        metrics::record_subscription_operation(&tenant_id.to_string(), "suspend");
        info!(tenant_id = %tenant_id, reason = %request.reason, "Subscription suspended");

        Ok(updated.into())
    }

    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, interval = %request.billing_interval))]
    async fn update_billing_interval(
        &self,
        tenant_id: Uuid,
        request: UpdateBillingIntervalRequest,
    ) -> Result<BillingIntervalChangeResponse, AppError> {
        const CODE: &str = "BILLING_INTERVAL_UPDATE_FAILED";

        request.validate()?;
        let mut subscription = self.load(tenant_id, CODE).await?;
        ensure_changeable(&subscription)?;

        let new_interval = request.billing_interval;
        if new_interval == subscription.billing_interval {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Subscription is already billed {}",
                new_interval
            )));
        }
        if subscription.plan == PlanTier::Free {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "The free plan has no billing interval to change"
            )));
        }
        ensure_listed(subscription.plan, new_interval)?;

        let now = Utc::now();
        let preview =
            billing::preview_change(&subscription, subscription.plan, new_interval, true, now);

        subscription.billing_interval = new_interval;
        subscription.amount = preview.new_amount;
        // A trial keeps its window; the new interval starts when it ends.
        if subscription.status != SubscriptionStatus::Trialing {
            let period = fresh_period(now, subscription.plan, new_interval);
            subscription.current_period_start = period.start;
            subscription.current_period_end = period.end;
            subscription.next_billing_date =
                catalog::is_recurring(subscription.plan, new_interval).then_some(period.end);
        }

        let updated = self
            .repository
            .update(&subscription)
            .await
            .map_err(repository_error(CODE))?;

        self.touch(tenant_id, request.requested_by).await;
        metrics::record_subscription_operation(&tenant_id.to_string(), "update_billing_interval");
        info!(
            tenant_id = %tenant_id,
            interval = %new_interval,
            amount = %updated.amount,
            proration = %preview.proration_amount,
            "Billing interval updated"
        );

        Ok(BillingIntervalChangeResponse {
            subscription: updated.into(),
            preview,
        })
    }

    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, succeeded = request.succeeded))]
    async fn record_payment(
        &self,
        tenant_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<SubscriptionResponse, AppError> {
        const CODE: &str = "PAYMENT_RECORD_FAILED";

        request.validate()?;
        if request.amount < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must not be negative"
            )));
        }

        let subscription = self.load(tenant_id, CODE).await?;
        if subscription.status == SubscriptionStatus::Canceled {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot record a payment on a canceled subscription"
            )));
        }

        let now = Utc::now();
        let payment = PaymentRecord {
            amount: request.amount,
            succeeded: request.succeeded,
            recorded_at: request.recorded_at.unwrap_or(now),
        };

        let recorded = self
            .repository
            .record_payment(tenant_id, &payment)
            .await
            .map_err(repository_error(CODE))?;

        let mut next = recorded.clone();
        if payment.succeeded {
            if next.status == SubscriptionStatus::PastDue {
                next.status = SubscriptionStatus::Active;
            }
            if next.status == SubscriptionStatus::Active && next.is_expired_at(now) {
                roll_period(&mut next, now);
            }
        } else if next.status == SubscriptionStatus::Active {
            next.status = SubscriptionStatus::PastDue;
        }

        let updated = if next != recorded {
            self.repository
                .update(&next)
                .await
                .map_err(repository_error(CODE))?
        } else {
            recorded
        };

        metrics::record_subscription_operation(&tenant_id.to_string(), "record_payment");
        info!(
            tenant_id = %tenant_id,
            succeeded = payment.succeeded,
            amount = %payment.amount,
            status = %updated.status,
            failed_payments = updated.failed_payment_count,
            "Payment recorded"
        );

        Ok(updated.into())
    }
}

/// Start the next period at the old period end, applying a scheduled
/// downgrade that has come due.
fn roll_period(subscription: &mut Subscription, now: DateTime<Utc>) {
    if let (Some(plan), Some(effective)) =
        (subscription.pending_plan, subscription.pending_plan_effective)
    {
        if effective <= now {
            let interval = subscription
                .pending_interval
                .unwrap_or(subscription.billing_interval);
            let change = catalog::plan_change(plan, interval);
            apply_plan(subscription, &change);
        }
    }

    let start = subscription.current_period_end;
    let end = catalog::calculate_period_end(start, subscription.plan, subscription.billing_interval);
    subscription.current_period_start = start;
    subscription.current_period_end = end;
    subscription.next_billing_date =
        catalog::is_recurring(subscription.plan, subscription.billing_interval).then_some(end);
}
