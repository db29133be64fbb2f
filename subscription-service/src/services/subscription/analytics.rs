use super::{repository_error, SubscriptionAnalytics, SubscriptionManager};
use crate::dtos::ListSubscriptionsResponse;
use crate::models::{ListSubscriptionsFilter, RevenueMetrics, SubscriptionStats};
use async_trait::async_trait;
use service_core::error::AppError;
use tracing::{debug, instrument};

#[async_trait]
impl SubscriptionAnalytics for SubscriptionManager {
    #[instrument(skip(self))]
    async fn get_stats(&self) -> Result<SubscriptionStats, AppError> {
        let stats = self
            .repository
            .stats()
            .await
            .map_err(repository_error("STATS_GET_FAILED"))?;

        debug!(total = stats.total, mrr = %stats.mrr, "Subscription stats computed");
        Ok(stats)
    }

    #[instrument(skip(self))]
    async fn get_revenue_metrics(&self) -> Result<RevenueMetrics, AppError> {
        let stats = self
            .repository
            .stats()
            .await
            .map_err(repository_error("REVENUE_METRICS_FAILED"))?;

        Ok(RevenueMetrics::from(&stats))
    }

    #[instrument(skip(self, filter), fields(page_size = filter.page_size))]
    async fn list_subscriptions(
        &self,
        filter: ListSubscriptionsFilter,
    ) -> Result<ListSubscriptionsResponse, AppError> {
        let page = self
            .repository
            .list(&filter)
            .await
            .map_err(repository_error("SUBSCRIPTION_LIST_FAILED"))?;

        debug!(
            returned = page.subscriptions.len(),
            has_more = page.next_page_token.is_some(),
            "Subscriptions listed"
        );
        Ok(page.into())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.repository
            .health_check()
            .await
            .map_err(repository_error("HEALTH_CHECK_FAILED"))
    }
}
