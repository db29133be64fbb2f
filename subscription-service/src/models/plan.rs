//! Plan tier, billing interval, limits and feature bundle types.

use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::fmt;
use std::str::FromStr;

/// Subscription plan tier, ordered by capability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Starter,
    Pro,
    Business,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 5] = [
        PlanTier::Free,
        PlanTier::Starter,
        PlanTier::Pro,
        PlanTier::Business,
        PlanTier::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
            PlanTier::Business => "business",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "starter" => Ok(PlanTier::Starter),
            "pro" => Ok(PlanTier::Pro),
            "business" => Ok(PlanTier::Business),
            "enterprise" => Ok(PlanTier::Enterprise),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown plan: {}",
                other
            ))),
        }
    }
}

/// Billing interval for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    Yearly,
    Lifetime,
}

impl BillingInterval {
    pub const ALL: [BillingInterval; 3] = [
        BillingInterval::Monthly,
        BillingInterval::Yearly,
        BillingInterval::Lifetime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Yearly => "yearly",
            BillingInterval::Lifetime => "lifetime",
        }
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingInterval {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(BillingInterval::Monthly),
            "yearly" | "annually" => Ok(BillingInterval::Yearly),
            "lifetime" => Ok(BillingInterval::Lifetime),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown billing interval: {}",
                other
            ))),
        }
    }
}

/// Numeric usage limits resolved from a plan. A value of zero or less means
/// unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_customers: i64,
    pub max_projects: i64,
    pub max_storage_gb: i64,
    pub max_team_members: i64,
    pub max_services: i64,
    pub max_bookings_per_month: i64,
}

/// Capabilities gated by plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    OnlineBooking,
    OnlinePayments,
    AdvancedProjectManagement,
    AdvancedAnalytics,
    ApiAccess,
    CustomBranding,
    WhiteLabeling,
    PrioritySupport,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::OnlineBooking => "online_booking",
            Feature::OnlinePayments => "online_payments",
            Feature::AdvancedProjectManagement => "advanced_project_management",
            Feature::AdvancedAnalytics => "advanced_analytics",
            Feature::ApiAccess => "api_access",
            Feature::CustomBranding => "custom_branding",
            Feature::WhiteLabeling => "white_labeling",
            Feature::PrioritySupport => "priority_support",
        }
    }
}

/// Fixed set of feature flags resolved from a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeatures {
    pub online_booking: bool,
    pub online_payments: bool,
    pub advanced_project_management: bool,
    pub advanced_analytics: bool,
    pub api_access: bool,
    pub custom_branding: bool,
    pub white_labeling: bool,
    pub priority_support: bool,
}

impl PlanFeatures {
    pub fn has(&self, feature: Feature) -> bool {
        match feature {
            Feature::OnlineBooking => self.online_booking,
            Feature::OnlinePayments => self.online_payments,
            Feature::AdvancedProjectManagement => self.advanced_project_management,
            Feature::AdvancedAnalytics => self.advanced_analytics,
            Feature::ApiAccess => self.api_access,
            Feature::CustomBranding => self.custom_branding,
            Feature::WhiteLabeling => self.white_labeling,
            Feature::PrioritySupport => self.priority_support,
        }
    }

    /// Names of the enabled features.
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            Feature::OnlineBooking,
            Feature::OnlinePayments,
            Feature::AdvancedProjectManagement,
            Feature::AdvancedAnalytics,
            Feature::ApiAccess,
            Feature::CustomBranding,
            Feature::WhiteLabeling,
            Feature::PrioritySupport,
        ]
        .into_iter()
        .filter(|f| self.has(*f))
        .map(|f| f.as_str())
        .collect()
    }
}
