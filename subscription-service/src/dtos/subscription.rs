use crate::models::{
    BillingInterval, BillingPreview, PlanLimits, PlanTier, Subscription, SubscriptionPage,
    SubscriptionStatus, UsageCounters,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateSubscriptionRequest {
    pub plan: PlanTier,
    pub billing_interval: BillingInterval,

    /// Zero means no trial. Ignored for the free plan.
    #[serde(default)]
    #[validate(range(min = 0, max = 365, message = "Trial days must be between 0 and 365"))]
    pub trial_days: i32,

    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,

    pub discount_percent: Option<Decimal>,

    #[validate(length(max = 255, message = "External customer id is too long"))]
    pub external_customer_id: Option<String>,

    pub metadata: Option<serde_json::Value>,
    pub created_by: Option<Uuid>,
}

impl CreateSubscriptionRequest {
    pub fn new(plan: PlanTier, billing_interval: BillingInterval) -> Self {
        Self {
            plan,
            billing_interval,
            trial_days: 0,
            currency: None,
            discount_percent: None,
            external_customer_id: None,
            metadata: None,
            created_by: None,
        }
    }

    pub fn with_trial_days(mut self, trial_days: i32) -> Self {
        self.trial_days = trial_days;
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateSubscriptionRequest {
    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,

    pub discount_percent: Option<Decimal>,

    #[validate(length(max = 255, message = "External customer id is too long"))]
    pub external_customer_id: Option<String>,

    #[validate(length(max = 255, message = "External subscription id is too long"))]
    pub external_subscription_id: Option<String>,

    pub metadata: Option<serde_json::Value>,
    pub updated_by: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ChangePlanRequest {
    pub new_plan: PlanTier,

    /// Keep the current interval when absent.
    pub billing_interval: Option<BillingInterval>,

    /// Only meaningful for downgrades; upgrades always apply immediately.
    #[serde(default)]
    pub change_immediately: bool,

    pub requested_by: Option<Uuid>,
}

impl ChangePlanRequest {
    pub fn new(new_plan: PlanTier) -> Self {
        Self {
            new_plan,
            billing_interval: None,
            change_immediately: false,
            requested_by: None,
        }
    }

    pub fn immediately(mut self) -> Self {
        self.change_immediately = true;
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StartTrialRequest {
    #[validate(range(min = 1, max = 365, message = "Trial days must be between 1 and 365"))]
    pub trial_days: i32,

    pub requested_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct CancelSubscriptionRequest {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    pub canceled_by: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SuspendSubscriptionRequest {
    #[validate(length(min = 1, max = 500, message = "Reason is required"))]
    pub reason: String,

    pub suspended_by: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateBillingIntervalRequest {
    pub billing_interval: BillingInterval,
    pub requested_by: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub succeeded: bool,

    /// Defaults to now.
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResponse {
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
    pub features: Vec<String>,
    pub usage: UsageCounters,
    pub failed_payment_count: i32,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub external_customer_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        Self {
            subscription_id: s.subscription_id,
            tenant_id: s.tenant_id,
            plan: s.plan,
            status: s.status,
            billing_interval: s.billing_interval,
            amount: s.amount,
            currency: s.currency,
            discount_percent: s.discount_percent,
            current_period_start: s.current_period_start,
            current_period_end: s.current_period_end,
            next_billing_date: s.next_billing_date,
            trial_end: s.trial_end,
            cancel_at_period_end: s.cancel_at_period_end,
            canceled_at: s.canceled_at,
            cancellation_reason: s.cancellation_reason,
            suspended_at: s.suspended_at,
            suspension_reason: s.suspension_reason,
            pending_plan: s.pending_plan,
            pending_interval: s.pending_interval,
            pending_plan_effective: s.pending_plan_effective,
            limits: s.limits,
            features: s.features.enabled().into_iter().map(String::from).collect(),
            usage: s.usage,
            failed_payment_count: s.failed_payment_count,
            last_payment_at: s.last_payment_at,
            external_customer_id: s.external_customer_id,
            external_subscription_id: s.external_subscription_id,
            metadata: s.metadata,
            created_at: s.created_utc,
            updated_at: s.updated_utc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePlanResponse {
    pub subscription: SubscriptionResponse,
    pub preview: BillingPreview,
    pub applied_immediately: bool,
    /// Set when a downgrade waits for the period end.
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingIntervalChangeResponse {
    pub subscription: SubscriptionResponse,
    pub preview: BillingPreview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSubscriptionsResponse {
    pub subscriptions: Vec<SubscriptionResponse>,
    pub next_page_token: Option<Uuid>,
}

impl From<SubscriptionPage> for ListSubscriptionsResponse {
    fn from(page: SubscriptionPage) -> Self {
        Self {
            subscriptions: page
                .subscriptions
                .into_iter()
                .map(SubscriptionResponse::from)
                .collect(),
            next_page_token: page.next_page_token,
        }
    }
}
