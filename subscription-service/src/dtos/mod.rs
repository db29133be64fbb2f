pub mod subscription;
pub mod usage;

pub use subscription::{
    BillingIntervalChangeResponse, CancelSubscriptionRequest, ChangePlanRequest,
    ChangePlanResponse, CreateSubscriptionRequest, ListSubscriptionsResponse,
    RecordPaymentRequest, StartTrialRequest, SubscriptionResponse, SuspendSubscriptionRequest,
    UpdateBillingIntervalRequest, UpdateSubscriptionRequest,
};
pub use usage::{FeatureAccessResponse, LimitCheckResponse, UpdateUsageRequest, UsageResponse};
