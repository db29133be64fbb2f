//! Outbound notifications raised by lifecycle sweeps.

use crate::models::Subscription;
use async_trait::async_trait;
use service_core::error::AppError;

/// Delivery channel for subscription notices (email, in-app, ...).
#[async_trait]
pub trait SubscriptionNotifier: Send + Sync {
    async fn trial_expiring(
        &self,
        subscription: &Subscription,
        days_remaining: i64,
    ) -> Result<(), AppError>;

    async fn payment_failed(&self, subscription: &Subscription) -> Result<(), AppError>;

    async fn subscription_suspended(
        &self,
        subscription: &Subscription,
        reason: &str,
    ) -> Result<(), AppError>;

    async fn trial_converted_to_free(&self, subscription: &Subscription) -> Result<(), AppError>;
}

/// Writes notices to the service log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl SubscriptionNotifier for LogNotifier {
    async fn trial_expiring(
        &self,
        subscription: &Subscription,
        days_remaining: i64,
    ) -> Result<(), AppError> {
        tracing::info!(
            tenant_id = %subscription.tenant_id,
            plan = %subscription.plan,
            days_remaining = days_remaining,
            trial_end = ?subscription.trial_end,
            "Trial expiring notice"
        );
        Ok(())
    }

    async fn payment_failed(&self, subscription: &Subscription) -> Result<(), AppError> {
        tracing::info!(
            tenant_id = %subscription.tenant_id,
            failed_payments = subscription.failed_payment_count,
            amount = %subscription.amount,
            currency = %subscription.currency,
            "Payment reminder notice"
        );
        Ok(())
    }

    async fn subscription_suspended(
        &self,
        subscription: &Subscription,
        reason: &str,
    ) -> Result<(), AppError> {
        tracing::info!(
            tenant_id = %subscription.tenant_id,
            reason = reason,
            "Subscription suspended notice"
        );
        Ok(())
    }

    async fn trial_converted_to_free(&self, subscription: &Subscription) -> Result<(), AppError> {
        tracing::info!(
            tenant_id = %subscription.tenant_id,
            "Trial ended, moved to free plan notice"
        );
        Ok(())
    }
}
