//! Services module for subscription-service.

pub mod billing;
pub mod catalog;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod repository;
pub mod subscription;

pub use memory::InMemorySubscriptionRepository;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{LogNotifier, SubscriptionNotifier};
pub use repository::SubscriptionRepository;
pub use subscription::{
    SubscriptionAnalytics, SubscriptionLifecycle, SubscriptionManager, SubscriptionService,
    SubscriptionSweeps, UsageTracking,
};
