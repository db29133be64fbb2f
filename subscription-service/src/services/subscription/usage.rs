use super::{repository_error, SubscriptionManager, UsageTracking};
use crate::dtos::{FeatureAccessResponse, LimitCheckResponse, UpdateUsageRequest, UsageResponse};
use crate::models::{Feature, Subscription, UsageDimension, UsageOperation, UsageReport};
use crate::services::metrics;
use async_trait::async_trait;
use service_core::error::AppError;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

fn usage_response(subscription: &Subscription) -> UsageResponse {
    UsageResponse {
        tenant_id: subscription.tenant_id,
        plan: subscription.plan,
        report: UsageReport::build(&subscription.usage, &subscription.limits),
    }
}

#[async_trait]
impl UsageTracking for SubscriptionManager {
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn get_usage(&self, tenant_id: Uuid) -> Result<UsageResponse, AppError> {
        let subscription = self.load(tenant_id, "USAGE_GET_FAILED").await?;
        Ok(usage_response(&subscription))
    }

    #[instrument(
        skip(self, request),
        fields(
            tenant_id = %tenant_id,
            dimension = %request.dimension,
            operation = request.operation.as_str()
        )
    )]
    async fn update_usage(
        &self,
        tenant_id: Uuid,
        request: UpdateUsageRequest,
    ) -> Result<UsageResponse, AppError> {
        const CODE: &str = "USAGE_UPDATE_FAILED";

        request.validate()?;
        let dimension = request.dimension;

        let (delta, current) = match request.operation {
            UsageOperation::Increment | UsageOperation::Decrement if request.amount == 0 => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Amount must be positive for {}",
                    request.operation.as_str()
                )));
            }
            UsageOperation::Increment => (request.amount, None),
            UsageOperation::Decrement => (-request.amount, None),
            UsageOperation::Set => {
                let current = self.load(tenant_id, CODE).await?;
                (request.amount - current.usage.get(dimension), Some(current))
            }
        };

        // Tracking only; limits are checked by enforce_limits.
        let updated = if delta > 0 {
            self.repository
                .increment_usage(tenant_id, dimension, delta)
                .await
                .map_err(repository_error(CODE))?
        } else if delta < 0 {
            self.repository
                .decrement_usage(tenant_id, dimension, -delta)
                .await
                .map_err(repository_error(CODE))?
        } else {
            debug!(tenant_id = %tenant_id, dimension = %dimension, "Usage unchanged");
            match current {
                Some(subscription) => subscription,
                None => self.load(tenant_id, CODE).await?,
            }
        };

        metrics::record_usage_update(dimension.as_str(), request.operation.as_str());
        debug!(
            tenant_id = %tenant_id,
            dimension = %dimension,
            delta = delta,
            value = updated.usage.get(dimension),
            "Usage updated"
        );

        Ok(usage_response(&updated))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn check_limits(&self, tenant_id: Uuid) -> Result<LimitCheckResponse, AppError> {
        let subscription = self.load(tenant_id, "LIMIT_CHECK_FAILED").await?;
        let report = UsageReport::build(&subscription.usage, &subscription.limits);
        Ok(LimitCheckResponse::from_report(tenant_id, report))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn enforce_limits(&self, tenant_id: Uuid) -> Result<(), AppError> {
        let subscription = self.load(tenant_id, "LIMIT_ENFORCE_FAILED").await?;
        let report = UsageReport::build(&subscription.usage, &subscription.limits);

        if report.is_over_limit {
            warn!(
                tenant_id = %tenant_id,
                plan = %subscription.plan,
                dimensions = ?report.over_limit_dimensions,
                "Usage over plan limits"
            );
            metrics::record_error("limit_exceeded", "enforce_limits");
            return Err(AppError::LimitExceeded(report.over_limit_dimensions));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn reset_monthly_usage(&self, tenant_id: Uuid) -> Result<UsageResponse, AppError> {
        let updated = self
            .repository
            .reset_usage(tenant_id, UsageDimension::BookingsPerMonth)
            .await
            .map_err(repository_error("USAGE_RESET_FAILED"))?;

        metrics::record_usage_update(UsageDimension::BookingsPerMonth.as_str(), "reset");
        info!(tenant_id = %tenant_id, "Monthly usage reset");

        Ok(usage_response(&updated))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn get_features(&self, tenant_id: Uuid) -> Result<FeatureAccessResponse, AppError> {
        let subscription = self.load(tenant_id, "FEATURES_GET_FAILED").await?;
        let access_granted = subscription.status.grants_access();

        let features = if access_granted {
            subscription
                .features
                .enabled()
                .into_iter()
                .map(String::from)
                .collect()
        } else {
            Vec::new()
        };

        Ok(FeatureAccessResponse {
            tenant_id,
            plan: subscription.plan,
            status: subscription.status,
            access_granted,
            features,
        })
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, feature = feature.as_str()))]
    async fn has_feature(&self, tenant_id: Uuid, feature: Feature) -> Result<bool, AppError> {
        let subscription = self.load(tenant_id, "FEATURES_GET_FAILED").await?;
        Ok(subscription.status.grants_access() && subscription.features.has(feature))
    }
}
