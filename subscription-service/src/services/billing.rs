//! Billing preview calculation for plan and billing-interval changes.

use crate::models::{BillingInterval, BillingPreview, PlanTier, Subscription};
use crate::services::catalog;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Share of the current period still ahead of `now`, in `[0, 1]`.
pub fn remaining_fraction(
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Decimal {
    let total = (period_end - period_start).num_seconds();
    let remaining = (period_end - now).num_seconds();

    if total <= 0 || remaining <= 0 {
        return Decimal::ZERO;
    }

    (Decimal::from(remaining) / Decimal::from(total)).min(Decimal::ONE)
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Preview moving `subscription` to `new_plan` billed at `new_interval`.
///
/// Deferred changes carry no proration and take effect at period end. For
/// immediate changes the unused share of the current amount is credited and
/// the same share of the new price charged. The next billing date stays at
/// the current period end either way.
pub fn preview_change(
    subscription: &Subscription,
    new_plan: PlanTier,
    new_interval: BillingInterval,
    immediate: bool,
    now: DateTime<Utc>,
) -> BillingPreview {
    let new_amount = catalog::plan_price(new_plan, new_interval);
    let period_end = subscription.current_period_end;

    let (proration_amount, effective_date) = if immediate {
        let fraction =
            remaining_fraction(subscription.current_period_start, period_end, now);
        let credit = subscription.amount * fraction;
        let charge = new_amount * fraction;
        (round_money(charge - credit), now)
    } else {
        (Decimal::ZERO, period_end)
    };

    BillingPreview {
        current_plan: subscription.plan,
        new_plan,
        current_interval: subscription.billing_interval,
        new_interval,
        current_amount: subscription.amount,
        new_amount,
        proration_amount,
        currency: subscription.currency.clone(),
        is_upgrade: catalog::is_plan_upgrade(subscription.plan, new_plan),
        immediate,
        effective_date,
        next_billing_date: period_end,
    }
}
