//! Usage counters and limit reports.

use super::PlanLimits;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tracked usage dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageDimension {
    Customers,
    Projects,
    StorageGb,
    TeamMembers,
    Services,
    BookingsPerMonth,
}

impl UsageDimension {
    pub const ALL: [UsageDimension; 6] = [
        UsageDimension::Customers,
        UsageDimension::Projects,
        UsageDimension::StorageGb,
        UsageDimension::TeamMembers,
        UsageDimension::Services,
        UsageDimension::BookingsPerMonth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageDimension::Customers => "customers",
            UsageDimension::Projects => "projects",
            UsageDimension::StorageGb => "storage_gb",
            UsageDimension::TeamMembers => "team_members",
            UsageDimension::Services => "services",
            UsageDimension::BookingsPerMonth => "bookings_per_month",
        }
    }

    /// The plan limit that bounds this dimension.
    pub fn limit(&self, limits: &PlanLimits) -> i64 {
        match self {
            UsageDimension::Customers => limits.max_customers,
            UsageDimension::Projects => limits.max_projects,
            UsageDimension::StorageGb => limits.max_storage_gb,
            UsageDimension::TeamMembers => limits.max_team_members,
            UsageDimension::Services => limits.max_services,
            UsageDimension::BookingsPerMonth => limits.max_bookings_per_month,
        }
    }
}

impl fmt::Display for UsageDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tenant usage counters. Never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub customers: i64,
    pub projects: i64,
    pub storage_gb: i64,
    pub team_members: i64,
    pub services: i64,
    pub bookings_this_month: i64,
}

impl UsageCounters {
    pub fn get(&self, dimension: UsageDimension) -> i64 {
        match dimension {
            UsageDimension::Customers => self.customers,
            UsageDimension::Projects => self.projects,
            UsageDimension::StorageGb => self.storage_gb,
            UsageDimension::TeamMembers => self.team_members,
            UsageDimension::Services => self.services,
            UsageDimension::BookingsPerMonth => self.bookings_this_month,
        }
    }

    fn slot(&mut self, dimension: UsageDimension) -> &mut i64 {
        match dimension {
            UsageDimension::Customers => &mut self.customers,
            UsageDimension::Projects => &mut self.projects,
            UsageDimension::StorageGb => &mut self.storage_gb,
            UsageDimension::TeamMembers => &mut self.team_members,
            UsageDimension::Services => &mut self.services,
            UsageDimension::BookingsPerMonth => &mut self.bookings_this_month,
        }
    }

    pub fn increment(&mut self, dimension: UsageDimension, amount: i64) {
        let slot = self.slot(dimension);
        *slot = slot.saturating_add(amount.max(0));
    }

    /// Subtract `amount`, clamping at zero.
    pub fn decrement(&mut self, dimension: UsageDimension, amount: i64) {
        let slot = self.slot(dimension);
        *slot = slot.saturating_sub(amount.max(0)).max(0);
    }

    pub fn reset(&mut self, dimension: UsageDimension) {
        *self.slot(dimension) = 0;
    }
}

/// Operation requested against a usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageOperation {
    Increment,
    Decrement,
    Set,
}

impl UsageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageOperation::Increment => "increment",
            UsageOperation::Decrement => "decrement",
            UsageOperation::Set => "set",
        }
    }
}

/// One dimension of a usage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMetric {
    pub dimension: UsageDimension,
    pub used: i64,
    pub limit: i64,
    pub unlimited: bool,
    pub percentage: f64,
    pub over_limit: bool,
}

impl UsageMetric {
    pub fn new(dimension: UsageDimension, used: i64, limit: i64) -> Self {
        let unlimited = limit <= 0;
        let percentage = if unlimited {
            0.0
        } else {
            used as f64 / limit as f64 * 100.0
        };

        Self {
            dimension,
            used,
            limit,
            unlimited,
            percentage,
            over_limit: !unlimited && percentage > 100.0,
        }
    }
}

/// Usage of every tracked dimension against the plan limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub metrics: Vec<UsageMetric>,
    pub is_over_limit: bool,
    pub over_limit_dimensions: Vec<String>,
}

impl UsageReport {
    pub fn build(usage: &UsageCounters, limits: &PlanLimits) -> Self {
        let metrics: Vec<UsageMetric> = UsageDimension::ALL
            .iter()
            .map(|d| UsageMetric::new(*d, usage.get(*d), d.limit(limits)))
            .collect();

        let over_limit_dimensions: Vec<String> = metrics
            .iter()
            .filter(|m| m.over_limit)
            .map(|m| m.dimension.as_str().to_string())
            .collect();

        Self {
            is_over_limit: !over_limit_dimensions.is_empty(),
            over_limit_dimensions,
            metrics,
        }
    }

    pub fn metric(&self, dimension: UsageDimension) -> Option<&UsageMetric> {
        self.metrics.iter().find(|m| m.dimension == dimension)
    }
}
