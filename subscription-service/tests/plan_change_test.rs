//! Plan change and billing preview tests for subscription-service.

mod common;

use chrono::{Duration, Months, Utc};
use common::{tenant_id, TestHarness};
use rust_decimal::Decimal;
use service_core::error::AppError;
use subscription_service::dtos::{
    CancelSubscriptionRequest, ChangePlanRequest, CreateSubscriptionRequest, RecordPaymentRequest,
};
use subscription_service::models::{BillingInterval, PlanTier, SubscriptionStatus};
use subscription_service::services::{catalog, SubscriptionLifecycle};

async fn subscribed(plan: PlanTier) -> TestHarness {
    let h = TestHarness::new();
    h.manager
        .create_subscription(
            tenant_id(),
            CreateSubscriptionRequest::new(plan, BillingInterval::Monthly),
        )
        .await
        .unwrap();
    h
}

#[tokio::test]
async fn upgrade_is_immediate_even_when_not_requested() {
    let h = subscribed(PlanTier::Starter).await;

    let response = h
        .manager
        .change_plan(tenant_id(), ChangePlanRequest::new(PlanTier::Pro))
        .await
        .unwrap();

    assert!(response.applied_immediately);
    assert_eq!(response.scheduled_for, None);
    assert!(response.preview.is_upgrade);
    assert_eq!(response.preview.new_amount, Decimal::new(7999, 2));
    assert_eq!(response.subscription.plan, PlanTier::Pro);
    assert_eq!(response.subscription.amount, Decimal::new(7999, 2));
    assert_eq!(
        response.subscription.limits,
        catalog::plan_limits(PlanTier::Pro)
    );
    assert!(response
        .subscription
        .features
        .contains(&"api_access".to_string()));
    // Period boundaries do not move on a plan change.
    assert_eq!(
        response.preview.next_billing_date,
        response.subscription.current_period_end
    );
}

#[tokio::test]
async fn downgrade_waits_for_period_end_by_default() {
    let h = subscribed(PlanTier::Pro).await;
    let before = h.stored(tenant_id()).await;

    let response = h
        .manager
        .change_plan(tenant_id(), ChangePlanRequest::new(PlanTier::Starter))
        .await
        .unwrap();

    assert!(!response.applied_immediately);
    assert_eq!(response.preview.proration_amount, Decimal::ZERO);
    assert_eq!(response.preview.effective_date, before.current_period_end);
    assert_eq!(response.scheduled_for, Some(before.current_period_end));

    let sub = response.subscription;
    assert_eq!(sub.plan, PlanTier::Pro);
    assert_eq!(sub.limits, catalog::plan_limits(PlanTier::Pro));
    assert_eq!(sub.pending_plan, Some(PlanTier::Starter));
    assert_eq!(sub.pending_plan_effective, Some(before.current_period_end));
}

#[tokio::test]
async fn immediate_downgrade_applies_now_with_credit() {
    let h = subscribed(PlanTier::Pro).await;

    let response = h
        .manager
        .change_plan(
            tenant_id(),
            ChangePlanRequest::new(PlanTier::Starter).immediately(),
        )
        .await
        .unwrap();

    assert!(response.applied_immediately);
    assert!(response.preview.proration_amount < Decimal::ZERO);
    assert_eq!(response.subscription.plan, PlanTier::Starter);
    assert_eq!(response.subscription.amount, Decimal::new(2999, 2));
    assert_eq!(
        response.subscription.limits,
        catalog::plan_limits(PlanTier::Starter)
    );
    assert_eq!(response.subscription.pending_plan, None);
}

#[tokio::test]
async fn upgrade_with_new_interval_uses_new_price() {
    let h = subscribed(PlanTier::Starter).await;

    let mut request = ChangePlanRequest::new(PlanTier::Business);
    request.billing_interval = Some(BillingInterval::Yearly);
    let response = h.manager.change_plan(tenant_id(), request).await.unwrap();

    assert_eq!(response.subscription.billing_interval, BillingInterval::Yearly);
    assert_eq!(response.subscription.amount, Decimal::new(199999, 2));
}

#[tokio::test]
async fn changing_to_current_plan_conflicts() {
    let h = subscribed(PlanTier::Pro).await;

    let result = h
        .manager
        .change_plan(tenant_id(), ChangePlanRequest::new(PlanTier::Pro))
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn canceled_subscription_cannot_change_plan() {
    let h = subscribed(PlanTier::Starter).await;
    h.manager
        .cancel_subscription(tenant_id(), CancelSubscriptionRequest::default())
        .await
        .unwrap();

    let result = h
        .manager
        .change_plan(tenant_id(), ChangePlanRequest::new(PlanTier::Pro))
        .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn preview_matches_change_without_writing() {
    let h = subscribed(PlanTier::Starter).await;
    let writes = h.repo.writes();

    let preview = h
        .manager
        .preview_plan_change(tenant_id(), ChangePlanRequest::new(PlanTier::Pro))
        .await
        .unwrap();

    assert_eq!(h.repo.writes(), writes);
    assert!(preview.immediate);
    assert_eq!(preview.current_amount, Decimal::new(2999, 2));
    assert_eq!(preview.new_amount, Decimal::new(7999, 2));
    assert_eq!(h.stored(tenant_id()).await.plan, PlanTier::Starter);
}

#[tokio::test]
async fn preview_at_period_start_charges_price_difference() {
    let h = subscribed(PlanTier::Starter).await;
    // Start the period just ahead of now so all of it remains.
    let now = Utc::now();
    h.rewrite(tenant_id(), |s| {
        s.current_period_start = now + Duration::seconds(5);
        s.current_period_end = s.current_period_start + Months::new(1);
    })
    .await;

    let preview = h
        .manager
        .preview_plan_change(tenant_id(), ChangePlanRequest::new(PlanTier::Pro))
        .await
        .unwrap();

    assert_eq!(preview.proration_amount, Decimal::new(5000, 2));
}

#[tokio::test]
async fn successful_payment_after_period_end_applies_scheduled_downgrade() {
    let h = subscribed(PlanTier::Pro).await;
    h.manager
        .change_plan(tenant_id(), ChangePlanRequest::new(PlanTier::Starter))
        .await
        .unwrap();

    let now = Utc::now();
    let old_end = now - Duration::days(1);
    h.rewrite(tenant_id(), |s| {
        s.current_period_start = old_end - Months::new(1);
        s.current_period_end = old_end;
        s.pending_plan_effective = Some(old_end);
    })
    .await;

    let paid = h
        .manager
        .record_payment(
            tenant_id(),
            RecordPaymentRequest {
                amount: Decimal::new(2999, 2),
                succeeded: true,
                recorded_at: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(paid.plan, PlanTier::Starter);
    assert_eq!(paid.amount, Decimal::new(2999, 2));
    assert_eq!(paid.limits, catalog::plan_limits(PlanTier::Starter));
    assert_eq!(paid.pending_plan, None);
    assert_eq!(paid.current_period_start, old_end);
    assert_eq!(paid.current_period_end, old_end + Months::new(1));
    assert_eq!(paid.next_billing_date, Some(paid.current_period_end));
}

#[tokio::test]
async fn scheduled_downgrade_keeps_requested_interval() {
    let h = subscribed(PlanTier::Pro).await;
    let request = ChangePlanRequest {
        billing_interval: Some(BillingInterval::Yearly),
        ..ChangePlanRequest::new(PlanTier::Starter)
    };

    let response = h.manager.change_plan(tenant_id(), request).await.unwrap();

    assert!(!response.applied_immediately);
    assert_eq!(response.preview.new_interval, BillingInterval::Yearly);
    assert_eq!(response.preview.new_amount, Decimal::new(29999, 2));
    assert_eq!(response.subscription.plan, PlanTier::Pro);
    assert_eq!(response.subscription.billing_interval, BillingInterval::Monthly);
    assert_eq!(response.subscription.pending_plan, Some(PlanTier::Starter));
    assert_eq!(
        response.subscription.pending_interval,
        Some(BillingInterval::Yearly)
    );

    let old_end = Utc::now() - Duration::days(1);
    h.rewrite(tenant_id(), |s| {
        s.current_period_start = old_end - Months::new(1);
        s.current_period_end = old_end;
        s.pending_plan_effective = Some(old_end);
    })
    .await;

    let paid = h
        .manager
        .record_payment(
            tenant_id(),
            RecordPaymentRequest {
                amount: Decimal::new(7999, 2),
                succeeded: true,
                recorded_at: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(paid.plan, PlanTier::Starter);
    assert_eq!(paid.billing_interval, BillingInterval::Yearly);
    assert_eq!(paid.amount, response.preview.new_amount);
    assert_eq!(paid.pending_interval, None);
    assert_eq!(paid.current_period_end, old_end + Months::new(12));
    assert_eq!(paid.next_billing_date, Some(paid.current_period_end));
}

#[tokio::test]
async fn upgrade_to_lifetime_clears_next_billing_date() {
    let h = subscribed(PlanTier::Starter).await;
    let before = h.stored(tenant_id()).await;
    let request = ChangePlanRequest {
        billing_interval: Some(BillingInterval::Lifetime),
        ..ChangePlanRequest::new(PlanTier::Pro)
    };

    let response = h.manager.change_plan(tenant_id(), request).await.unwrap();

    let sub = response.subscription;
    assert_eq!(sub.billing_interval, BillingInterval::Lifetime);
    assert_eq!(sub.amount, Decimal::new(239999, 2));
    assert_eq!(sub.next_billing_date, None);
    assert_eq!(sub.current_period_start, before.current_period_start);
    assert_eq!(sub.current_period_end, before.current_period_end);
}

#[tokio::test]
async fn immediate_downgrade_to_free_clears_next_billing_date() {
    let h = subscribed(PlanTier::Starter).await;

    let response = h
        .manager
        .change_plan(
            tenant_id(),
            ChangePlanRequest::new(PlanTier::Free).immediately(),
        )
        .await
        .unwrap();

    assert_eq!(response.subscription.plan, PlanTier::Free);
    assert_eq!(response.subscription.next_billing_date, None);
}

#[tokio::test]
async fn upgrade_during_trial_keeps_trial_window() {
    let h = TestHarness::new();
    h.manager
        .create_subscription(
            tenant_id(),
            CreateSubscriptionRequest::new(PlanTier::Starter, BillingInterval::Monthly)
                .with_trial_days(14),
        )
        .await
        .unwrap();

    let response = h
        .manager
        .change_plan(tenant_id(), ChangePlanRequest::new(PlanTier::Pro))
        .await
        .unwrap();

    let sub = response.subscription;
    assert_eq!(sub.status, SubscriptionStatus::Trialing);
    assert_eq!(sub.plan, PlanTier::Pro);
    assert_eq!(sub.trial_end, Some(sub.current_period_end));
    assert_eq!(sub.next_billing_date, Some(sub.current_period_end));
}
