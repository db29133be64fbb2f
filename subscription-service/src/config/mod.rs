use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub billing: BillingSettings,
}

/// Business knobs for the lifecycle manager and the sweeps.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BillingSettings {
    pub default_currency: String,
    /// Expiring-trial sweep looks this many days ahead.
    pub trial_expiry_horizon_days: i64,
    /// Consecutive failed payments that trigger suspension.
    pub failed_payment_threshold: i32,
    pub max_trial_days: i32,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            trial_expiry_horizon_days: 3,
            failed_payment_threshold: 3,
            max_trial_days: 90,
        }
    }
}

impl BillingSettings {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let settings = Self {
            default_currency: env::var("DEFAULT_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or(defaults.default_currency),
            trial_expiry_horizon_days: parse_or(
                env::var("TRIAL_EXPIRY_HORIZON_DAYS").ok(),
                defaults.trial_expiry_horizon_days,
            ),
            failed_payment_threshold: parse_or(
                env::var("FAILED_PAYMENT_THRESHOLD").ok(),
                defaults.failed_payment_threshold,
            ),
            max_trial_days: parse_or(env::var("MAX_TRIAL_DAYS").ok(), defaults.max_trial_days),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.trial_expiry_horizon_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TRIAL_EXPIRY_HORIZON_DAYS must be positive"
            )));
        }
        if self.failed_payment_threshold <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "FAILED_PAYMENT_THRESHOLD must be positive"
            )));
        }
        if self.max_trial_days < 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MAX_TRIAL_DAYS must not be negative"
            )));
        }
        if self.default_currency.len() != 3 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_CURRENCY must be a 3-letter code, got {}",
                self.default_currency
            )));
        }
        Ok(())
    }
}

impl SubscriptionConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "subscription-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|e| !e.is_empty()),
            billing: BillingSettings::from_env()?,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        assert_eq!(parse_or(Some("abc".to_string()), 3i32), 3);
        assert_eq!(parse_or(None, 90i32), 90);
        assert_eq!(parse_or(Some(" 5 ".to_string()), 3i64), 5);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(BillingSettings::default().validate().is_ok());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let settings = BillingSettings {
            failed_payment_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn zero_horizon_is_rejected() {
        let settings = BillingSettings {
            trial_expiry_horizon_days: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(AppError::ConfigError(_))));
    }
}
