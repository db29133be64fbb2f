//! Background sweep tests for subscription-service.

mod common;

use chrono::{Duration, Utc};
use common::TestHarness;
use rust_decimal::Decimal;
use subscription_service::config::BillingSettings;
use subscription_service::dtos::{CreateSubscriptionRequest, RecordPaymentRequest};
use subscription_service::models::{
    BillingInterval, PlanTier, SubscriptionStatus, SweepAction, SweepKind,
};
use subscription_service::services::{catalog, SubscriptionLifecycle, SubscriptionSweeps};
use uuid::Uuid;

async fn subscribe(h: &TestHarness, plan: PlanTier, trial_days: i32) -> Uuid {
    let tenant_id = Uuid::new_v4();
    h.manager
        .create_subscription(
            tenant_id,
            CreateSubscriptionRequest::new(plan, BillingInterval::Monthly)
                .with_trial_days(trial_days),
        )
        .await
        .unwrap();
    tenant_id
}

async fn fail_payments(h: &TestHarness, tenant_id: Uuid, times: usize) {
    for _ in 0..times {
        h.manager
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
}

/// Move the current period (and trial, if any) into the past.
async fn expire(h: &TestHarness, tenant_id: Uuid) {
    let ended = Utc::now() - Duration::days(1);
    h.rewrite(tenant_id, |s| {
        s.current_period_start = ended - Duration::days(30);
        s.current_period_end = ended;
        if s.trial_end.is_some() {
            s.trial_end = Some(ended);
        }
    })
    .await;
}

#[tokio::test]
async fn failed_payment_threshold_suspends_at_three() {
    let h = TestHarness::new();
    let three = subscribe(&h, PlanTier::Starter, 0).await;
    let two = subscribe(&h, PlanTier::Starter, 0).await;
    let _healthy = subscribe(&h, PlanTier::Starter, 0).await;
    fail_payments(&h, three, 3).await;
    fail_payments(&h, two, 2).await;

    let report = h.manager.process_failed_payments().await.unwrap();

    assert_eq!(report.kind, SweepKind::FailedPayments);
    assert_eq!(report.subscriptions_processed, 2);
    assert_eq!(report.count(SweepAction::Suspended), 1);
    assert_eq!(report.count(SweepAction::Reminded), 1);
    assert!(report.completed_utc.is_some());

    let suspended = h.stored(three).await;
    assert_eq!(suspended.status, SubscriptionStatus::Suspended);
    assert_eq!(
        suspended.suspension_reason.as_deref(),
        Some("Too many failed payments")
    );
    assert_eq!(h.stored(two).await.status, SubscriptionStatus::PastDue);

    assert_eq!(h.notifier.count("subscription_suspended"), 1);
    assert_eq!(h.notifier.count("payment_failed"), 1);
}

#[tokio::test]
async fn failed_payment_sweep_is_safe_to_rerun() {
    let h = TestHarness::new();
    let three = subscribe(&h, PlanTier::Pro, 0).await;
    let one = subscribe(&h, PlanTier::Pro, 0).await;
    fail_payments(&h, three, 3).await;
    fail_payments(&h, one, 1).await;

    h.manager.process_failed_payments().await.unwrap();
    let second = h.manager.process_failed_payments().await.unwrap();

    assert_eq!(second.subscriptions_processed, 1);
    assert_eq!(second.count(SweepAction::Reminded), 1);
    assert_eq!(h.stored(three).await.status, SubscriptionStatus::Suspended);
}

#[tokio::test]
async fn failed_payment_threshold_is_configurable() {
    let h = TestHarness::with_settings(BillingSettings {
        failed_payment_threshold: 2,
        ..Default::default()
    });
    let two = subscribe(&h, PlanTier::Starter, 0).await;
    fail_payments(&h, two, 2).await;

    let report = h.manager.process_failed_payments().await.unwrap();

    assert_eq!(report.count(SweepAction::Suspended), 1);
    assert_eq!(h.stored(two).await.status, SubscriptionStatus::Suspended);
}

#[tokio::test]
async fn expired_trial_moves_to_free_plan() {
    let h = TestHarness::new();
    let trial = subscribe(&h, PlanTier::Business, 14).await;
    expire(&h, trial).await;

    let report = h.manager.process_expired_subscriptions().await.unwrap();

    assert_eq!(report.count(SweepAction::ConvertedToFree), 1);
    let converted = h.stored(trial).await;
    assert_eq!(converted.plan, PlanTier::Free);
    assert_eq!(converted.status, SubscriptionStatus::Active);
    assert_eq!(converted.trial_end, None);
    assert_eq!(converted.amount, Decimal::ZERO);
    assert_eq!(converted.limits, catalog::plan_limits(PlanTier::Free));
    assert!(converted.current_period_end > Utc::now());
    assert_eq!(h.notifier.count("trial_converted_to_free"), 1);
}

#[tokio::test]
async fn expired_paid_subscription_is_suspended() {
    let h = TestHarness::new();
    let active = subscribe(&h, PlanTier::Pro, 0).await;
    let current = subscribe(&h, PlanTier::Pro, 0).await;
    expire(&h, active).await;

    let report = h.manager.process_expired_subscriptions().await.unwrap();

    assert_eq!(report.subscriptions_processed, 1);
    let suspended = h.stored(active).await;
    assert_eq!(suspended.status, SubscriptionStatus::Suspended);
    assert_eq!(
        suspended.suspension_reason.as_deref(),
        Some("Expired subscription")
    );
    assert_eq!(h.stored(current).await.status, SubscriptionStatus::Active);

    let rerun = h.manager.process_expired_subscriptions().await.unwrap();
    assert_eq!(rerun.subscriptions_processed, 0);
}

#[tokio::test]
async fn one_bad_record_does_not_stop_the_sweep() {
    let h = TestHarness::new();
    let broken = subscribe(&h, PlanTier::Starter, 0).await;
    let fine = subscribe(&h, PlanTier::Starter, 0).await;
    expire(&h, broken).await;
    expire(&h, fine).await;
    h.repo.fail_writes_for(broken);

    let report = h.manager.process_expired_subscriptions().await.unwrap();

    assert_eq!(report.subscriptions_processed, 2);
    assert_eq!(report.subscriptions_failed, 1);
    assert_eq!(report.subscriptions_succeeded, 1);
    let failure = report
        .results
        .iter()
        .find(|r| r.action == SweepAction::Failed)
        .unwrap();
    assert_eq!(failure.tenant_id, broken);
    assert!(failure.error_message.is_some());
    assert_eq!(h.stored(fine).await.status, SubscriptionStatus::Suspended);
}

#[tokio::test]
async fn expiring_trials_are_notified_without_state_change() {
    let h = TestHarness::new();
    let soon = subscribe(&h, PlanTier::Pro, 2).await;
    let later = subscribe(&h, PlanTier::Pro, 10).await;
    let writes = h.repo.writes();

    let report = h.manager.process_expiring_trials().await.unwrap();

    assert_eq!(report.subscriptions_processed, 1);
    assert_eq!(report.count(SweepAction::Notified), 1);
    assert_eq!(report.results[0].tenant_id, soon);
    assert_eq!(h.notifier.notices(), vec![("trial_expiring", soon)]);
    assert_eq!(h.repo.writes(), writes);
    assert_eq!(h.stored(later).await.status, SubscriptionStatus::Trialing);

    // Notification only, so a rerun repeats it.
    let rerun = h.manager.run_sweep(SweepKind::ExpiringTrials).await.unwrap();
    assert_eq!(rerun.count(SweepAction::Notified), 1);
}

#[tokio::test]
async fn failed_payment_sweep_leaves_trials_alone() {
    let h = TestHarness::new();
    let tenant_id = subscribe(&h, PlanTier::Pro, 14).await;
    fail_payments(&h, tenant_id, 3).await;
    assert_eq!(h.stored(tenant_id).await.status, SubscriptionStatus::Trialing);

    let report = h.manager.process_failed_payments().await.unwrap();

    assert_eq!(report.subscriptions_processed, 0);
    let stored = h.stored(tenant_id).await;
    assert_eq!(stored.status, SubscriptionStatus::Trialing);
    assert_eq!(stored.trial_end, Some(stored.current_period_end));
    assert_eq!(h.notifier.count("subscription_suspended"), 0);
    assert_eq!(h.notifier.count("payment_failed"), 0);
}
