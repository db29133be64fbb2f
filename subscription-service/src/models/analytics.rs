//! Aggregate subscription statistics.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts and revenue aggregated across all tenants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionStats {
    pub total: i64,
    pub by_plan: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
    pub mrr: Decimal,
    pub arr: Decimal,
    /// Canceled share of all subscriptions, as a percentage.
    pub churn_rate: Decimal,
    /// Monthly recurring revenue per plan.
    pub revenue_by_plan: BTreeMap<String, Decimal>,
}

/// Revenue view over [`SubscriptionStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueMetrics {
    pub mrr: Decimal,
    pub arr: Decimal,
    pub churn_rate: Decimal,
    pub average_revenue_per_subscription: Decimal,
    pub revenue_by_plan: BTreeMap<String, Decimal>,
}

impl From<&SubscriptionStats> for RevenueMetrics {
    fn from(stats: &SubscriptionStats) -> Self {
        let paying: i64 = stats
            .by_status
            .iter()
            .filter(|(status, _)| matches!(status.as_str(), "active" | "past_due"))
            .map(|(_, count)| *count)
            .sum();

        let average_revenue_per_subscription = if paying > 0 {
            (stats.mrr / Decimal::from(paying)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        Self {
            mrr: stats.mrr,
            arr: stats.arr,
            churn_rate: stats.churn_rate,
            average_revenue_per_subscription,
            revenue_by_plan: stats.revenue_by_plan.clone(),
        }
    }
}
