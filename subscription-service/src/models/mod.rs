//! Domain models for subscription-service.

mod analytics;
mod plan;
mod preview;
mod subscription;
mod sweep;
mod usage;

pub use analytics::{RevenueMetrics, SubscriptionStats};
pub use plan::{BillingInterval, Feature, PlanFeatures, PlanLimits, PlanTier};
pub use preview::BillingPreview;
pub use subscription::{
    BillingPeriod, ListSubscriptionsFilter, PaymentRecord, PlanChange, Subscription,
    SubscriptionPage, SubscriptionStatus,
};
pub use sweep::{SweepAction, SweepKind, SweepReport, SweepResult};
pub use usage::{UsageCounters, UsageDimension, UsageMetric, UsageOperation, UsageReport};
