//! Background sweep run model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which batch scan ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    ExpiringTrials,
    FailedPayments,
    ExpiredSubscriptions,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::ExpiringTrials => "expiring_trials",
            SweepKind::FailedPayments => "failed_payments",
            SweepKind::ExpiredSubscriptions => "expired_subscriptions",
        }
    }

    /// Parse the path segment used by the sweep trigger endpoint.
    pub fn from_slug(s: &str) -> Option<Self> {
        match s {
            "expiring-trials" | "expiring_trials" => Some(SweepKind::ExpiringTrials),
            "failed-payments" | "failed_payments" => Some(SweepKind::FailedPayments),
            "expired-subscriptions" | "expired_subscriptions" => {
                Some(SweepKind::ExpiredSubscriptions)
            }
            _ => None,
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a sweep did to one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAction {
    Notified,
    Reminded,
    Suspended,
    ConvertedToFree,
    Failed,
}

impl SweepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepAction::Notified => "notified",
            SweepAction::Reminded => "reminded",
            SweepAction::Suspended => "suspended",
            SweepAction::ConvertedToFree => "converted_to_free",
            SweepAction::Failed => "failed",
        }
    }
}

/// Per-subscription sweep outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub tenant_id: Uuid,
    pub subscription_id: Uuid,
    pub action: SweepAction,
    pub error_message: Option<String>,
}

/// Summary of one sweep run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub kind: SweepKind,
    pub started_utc: DateTime<Utc>,
    pub completed_utc: Option<DateTime<Utc>>,
    pub subscriptions_processed: i32,
    pub subscriptions_succeeded: i32,
    pub subscriptions_failed: i32,
    pub results: Vec<SweepResult>,
}

impl SweepReport {
    pub fn start(kind: SweepKind) -> Self {
        Self {
            kind,
            started_utc: Utc::now(),
            completed_utc: None,
            subscriptions_processed: 0,
            subscriptions_succeeded: 0,
            subscriptions_failed: 0,
            results: Vec::new(),
        }
    }

    pub fn record_success(&mut self, tenant_id: Uuid, subscription_id: Uuid, action: SweepAction) {
        self.subscriptions_processed += 1;
        self.subscriptions_succeeded += 1;
        self.results.push(SweepResult {
            tenant_id,
            subscription_id,
            action,
            error_message: None,
        });
    }

    pub fn record_failure(&mut self, tenant_id: Uuid, subscription_id: Uuid, error: String) {
        self.subscriptions_processed += 1;
        self.subscriptions_failed += 1;
        self.results.push(SweepResult {
            tenant_id,
            subscription_id,
            action: SweepAction::Failed,
            error_message: Some(error),
        });
    }

    pub fn finish(mut self) -> Self {
        self.completed_utc = Some(Utc::now());
        self
    }

    /// Number of results with the given action.
    pub fn count(&self, action: SweepAction) -> usize {
        self.results.iter().filter(|r| r.action == action).count()
    }
}
