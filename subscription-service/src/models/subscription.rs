//! Subscription model.

use super::{BillingInterval, PlanFeatures, PlanLimits, PlanTier, UsageCounters};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Suspended,
    Canceled,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 5] = [
        SubscriptionStatus::Trialing,
        SubscriptionStatus::Active,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Suspended,
        SubscriptionStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Whether the tenant may use plan features in this status.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }

    /// Whether recurring revenue is counted for this status.
    pub fn is_billable(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::PastDue)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant's subscription. Exactly one per tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub tenant_id: Uuid,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub billing_interval: BillingInterval,
    pub amount: Decimal,
    pub currency: String,
    pub discount_percent: Decimal,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub suspension_reason: Option<String>,
    pub pending_plan: Option<PlanTier>,
    pub pending_interval: Option<BillingInterval>,
    pub pending_plan_effective: Option<DateTime<Utc>>,
    pub limits: PlanLimits,
    pub features: PlanFeatures,
    pub usage: UsageCounters,
    pub failed_payment_count: i32,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub last_payment_amount: Option<Decimal>,
    pub external_customer_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub updated_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    /// Whether the current period has ended at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.current_period_end < now
    }
}

/// A billing period window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Plan, price, limits and features to apply in one plan-changing write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanChange {
    pub plan: PlanTier,
    pub billing_interval: BillingInterval,
    pub amount: Decimal,
    pub limits: PlanLimits,
    pub features: PlanFeatures,
}

/// A payment outcome reported by the payment gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub amount: Decimal,
    pub succeeded: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Filter parameters for listing subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSubscriptionsFilter {
    pub plan: Option<PlanTier>,
    pub status: Option<SubscriptionStatus>,
    pub billing_interval: Option<BillingInterval>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

/// One page of subscriptions ordered by subscription id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPage {
    pub subscriptions: Vec<Subscription>,
    pub next_page_token: Option<Uuid>,
}
