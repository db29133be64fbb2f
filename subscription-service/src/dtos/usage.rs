use crate::models::{
    PlanTier, SubscriptionStatus, UsageDimension, UsageMetric, UsageOperation, UsageReport,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateUsageRequest {
    pub dimension: UsageDimension,
    pub operation: UsageOperation,

    /// Step for increment/decrement, target value for set.
    #[validate(range(min = 0, message = "Amount must not be negative"))]
    pub amount: i64,
}

impl UpdateUsageRequest {
    pub fn new(dimension: UsageDimension, operation: UsageOperation, amount: i64) -> Self {
        Self {
            dimension,
            operation,
            amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageResponse {
    pub tenant_id: Uuid,
    pub plan: PlanTier,
    #[serde(flatten)]
    pub report: UsageReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitCheckResponse {
    pub tenant_id: Uuid,
    pub within_limits: bool,
    pub over_limit_dimensions: Vec<String>,
    pub metrics: Vec<UsageMetric>,
}

impl LimitCheckResponse {
    pub fn from_report(tenant_id: Uuid, report: UsageReport) -> Self {
        Self {
            tenant_id,
            within_limits: !report.is_over_limit,
            over_limit_dimensions: report.over_limit_dimensions,
            metrics: report.metrics,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureAccessResponse {
    pub tenant_id: Uuid,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    /// False while suspended or canceled; `features` is then empty.
    pub access_granted: bool,
    pub features: Vec<String>,
}
