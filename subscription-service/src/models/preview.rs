//! Billing preview model.

use super::{BillingInterval, PlanTier};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Advisory outcome of a plan or billing-interval change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingPreview {
    pub current_plan: PlanTier,
    pub new_plan: PlanTier,
    pub current_interval: BillingInterval,
    pub new_interval: BillingInterval,
    pub current_amount: Decimal,
    pub new_amount: Decimal,
    /// Charge for the rest of the period; negative means a credit is due.
    pub proration_amount: Decimal,
    pub currency: String,
    pub is_upgrade: bool,
    pub immediate: bool,
    pub effective_date: DateTime<Utc>,
    pub next_billing_date: DateTime<Utc>,
}
