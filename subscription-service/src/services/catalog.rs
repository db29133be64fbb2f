//! Plan catalog: static price, limit and feature tables per plan tier.
//!
//! The tables are built once on first use and never mutated. Yearly prices are
//! discounted in the table itself rather than derived from the monthly price.

use crate::models::{BillingInterval, PlanChange, PlanFeatures, PlanLimits, PlanTier};
use chrono::{DateTime, Months, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Price per (plan, interval). Missing combinations are catalog gaps.
static PRICING: Lazy<HashMap<(PlanTier, BillingInterval), Decimal>> = Lazy::new(|| {
    use BillingInterval::*;
    use PlanTier::*;

    HashMap::from([
        ((Free, Monthly), Decimal::ZERO),
        ((Free, Yearly), Decimal::ZERO),
        ((Free, Lifetime), Decimal::ZERO),
        ((Starter, Monthly), Decimal::new(2999, 2)),
        ((Starter, Yearly), Decimal::new(29999, 2)),
        ((Starter, Lifetime), Decimal::new(89999, 2)),
        ((Pro, Monthly), Decimal::new(7999, 2)),
        ((Pro, Yearly), Decimal::new(79999, 2)),
        ((Pro, Lifetime), Decimal::new(239999, 2)),
        ((Business, Monthly), Decimal::new(19999, 2)),
        ((Business, Yearly), Decimal::new(199999, 2)),
        ((Business, Lifetime), Decimal::new(599999, 2)),
        // Enterprise lifetime deals are negotiated, not listed.
        ((Enterprise, Monthly), Decimal::new(49999, 2)),
        ((Enterprise, Yearly), Decimal::new(499999, 2)),
    ])
});

/// Limits indexed by plan rank.
static LIMITS: [PlanLimits; 5] = [
    PlanLimits {
        max_customers: 50,
        max_projects: 5,
        max_storage_gb: 1,
        max_team_members: 1,
        max_services: 5,
        max_bookings_per_month: 50,
    },
    PlanLimits {
        max_customers: 500,
        max_projects: 25,
        max_storage_gb: 10,
        max_team_members: 3,
        max_services: 20,
        max_bookings_per_month: 500,
    },
    PlanLimits {
        max_customers: 2_500,
        max_projects: 100,
        max_storage_gb: 50,
        max_team_members: 10,
        max_services: 100,
        max_bookings_per_month: 2_500,
    },
    PlanLimits {
        max_customers: 10_000,
        max_projects: 500,
        max_storage_gb: 250,
        max_team_members: 50,
        max_services: 500,
        max_bookings_per_month: 10_000,
    },
    // Enterprise: unlimited everywhere
    PlanLimits {
        max_customers: -1,
        max_projects: -1,
        max_storage_gb: -1,
        max_team_members: -1,
        max_services: -1,
        max_bookings_per_month: -1,
    },
];

/// Feature bundles indexed by plan rank.
static FEATURES: [PlanFeatures; 5] = [
    PlanFeatures {
        online_booking: true,
        online_payments: false,
        advanced_project_management: false,
        advanced_analytics: false,
        api_access: false,
        custom_branding: false,
        white_labeling: false,
        priority_support: false,
    },
    PlanFeatures {
        online_booking: true,
        online_payments: true,
        advanced_project_management: false,
        advanced_analytics: false,
        api_access: false,
        custom_branding: true,
        white_labeling: false,
        priority_support: false,
    },
    PlanFeatures {
        online_booking: true,
        online_payments: true,
        advanced_project_management: true,
        advanced_analytics: true,
        api_access: true,
        custom_branding: true,
        white_labeling: false,
        priority_support: false,
    },
    PlanFeatures {
        online_booking: true,
        online_payments: true,
        advanced_project_management: true,
        advanced_analytics: true,
        api_access: true,
        custom_branding: true,
        white_labeling: true,
        priority_support: true,
    },
    PlanFeatures {
        online_booking: true,
        online_payments: true,
        advanced_project_management: true,
        advanced_analytics: true,
        api_access: true,
        custom_branding: true,
        white_labeling: true,
        priority_support: true,
    },
];

/// Capability rank used for upgrade/downgrade comparison.
pub fn plan_rank(plan: PlanTier) -> u8 {
    match plan {
        PlanTier::Free => 0,
        PlanTier::Starter => 1,
        PlanTier::Pro => 2,
        PlanTier::Business => 3,
        PlanTier::Enterprise => 4,
    }
}

/// Listed price for a plan at an interval; zero for combinations the
/// catalog does not list.
pub fn plan_price(plan: PlanTier, interval: BillingInterval) -> Decimal {
    match PRICING.get(&(plan, interval)) {
        Some(price) => *price,
        None => {
            tracing::warn!(plan = %plan, interval = %interval, "No catalog price for plan/interval");
            Decimal::ZERO
        }
    }
}

/// Whether the catalog lists a price for this combination.
pub fn is_listed(plan: PlanTier, interval: BillingInterval) -> bool {
    PRICING.contains_key(&(plan, interval))
}

pub fn plan_limits(plan: PlanTier) -> PlanLimits {
    LIMITS[plan_rank(plan) as usize]
}

pub fn plan_features(plan: PlanTier) -> PlanFeatures {
    FEATURES[plan_rank(plan) as usize]
}

/// True when `target` ranks strictly above `current`.
pub fn is_plan_upgrade(current: PlanTier, target: PlanTier) -> bool {
    plan_rank(target) > plan_rank(current)
}

/// String-level upgrade check; unrecognized plan names are never an upgrade.
pub fn is_plan_upgrade_by_name(current: &str, target: &str) -> bool {
    match (current.parse::<PlanTier>(), target.parse::<PlanTier>()) {
        (Ok(current), Ok(target)) => is_plan_upgrade(current, target),
        _ => false,
    }
}

/// Everything a plan-changing write must apply together.
pub fn plan_change(plan: PlanTier, interval: BillingInterval) -> PlanChange {
    PlanChange {
        plan,
        billing_interval: interval,
        amount: plan_price(plan, interval),
        limits: plan_limits(plan),
        features: plan_features(plan),
    }
}

/// End of a paid period starting at `start`.
///
/// Free plans run in one-year windows and lifetime billing in ten-year windows.
pub fn calculate_period_end(
    start: DateTime<Utc>,
    plan: PlanTier,
    interval: BillingInterval,
) -> DateTime<Utc> {
    let months = match (plan, interval) {
        (PlanTier::Free, _) => 12,
        (_, BillingInterval::Monthly) => 1,
        (_, BillingInterval::Yearly) => 12,
        (_, BillingInterval::Lifetime) => 120,
    };

    start + Months::new(months)
}

/// Whether periods on this plan/interval produce a next billing date.
pub fn is_recurring(plan: PlanTier, interval: BillingInterval) -> bool {
    plan != PlanTier::Free && interval != BillingInterval::Lifetime
}
