//! Hourly spending budget.
//!
//! [`SpendingGuard`] keeps cumulative spend per hour bucket (Unix seconds
//! integer-divided by 3600). Spend is counted when a payment is initiated,
//! not when it confirms, so a submitted transfer that later fails still
//! consumes budget for its hour.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::timestamp::{Clock, SystemClock};

/// Number of past hour buckets kept alongside the current one.
pub const RETAINED_HOURS: u64 = 24;

/// Budget left in the current hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// No hourly limit configured.
    Unlimited,
    /// Amount still spendable this hour, never negative.
    Remaining(Decimal),
}

impl Budget {
    /// Returns `true` if `amount` fits in the budget.
    #[must_use]
    pub fn allows(&self, amount: Decimal) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Remaining(remaining) => amount <= *remaining,
        }
    }
}

/// Enforces and tracks a per-hour spending budget.
///
/// A negative limit disables enforcement.
#[derive(Clone)]
pub struct SpendingGuard {
    limit_per_hour: Decimal,
    buckets: BTreeMap<u64, Decimal>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SpendingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpendingGuard")
            .field("limit_per_hour", &self.limit_per_hour)
            .field("buckets", &self.buckets)
            .finish_non_exhaustive()
    }
}

impl Default for SpendingGuard {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl SpendingGuard {
    /// Creates a guard with the given hourly limit. A negative limit means unlimited.
    #[must_use]
    pub fn new(limit_per_hour: Decimal) -> Self {
        Self {
            limit_per_hour,
            buckets: BTreeMap::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Creates a guard without a limit.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(Decimal::NEGATIVE_ONE)
    }

    /// Replaces the clock used to pick the current bucket.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configured hourly limit; negative means unlimited.
    #[must_use]
    pub const fn limit_per_hour(&self) -> Decimal {
        self.limit_per_hour
    }

    /// Returns `true` when no limit is enforced.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.limit_per_hour.is_sign_negative()
    }

    /// Adds `amount` to the current hour bucket and prunes stale buckets.
    pub fn track(&mut self, amount: Decimal) {
        let hour = self.clock.now().hour_bucket();
        *self.buckets.entry(hour).or_insert(Decimal::ZERO) += amount;
        self.prune(hour);
    }

    /// Spend recorded in the current hour bucket.
    #[must_use]
    pub fn spent_this_hour(&self) -> Decimal {
        let hour = self.clock.now().hour_bucket();
        self.buckets.get(&hour).copied().unwrap_or(Decimal::ZERO)
    }

    /// Budget left in the current hour, floored at zero.
    #[must_use]
    pub fn remaining_budget(&self) -> Budget {
        if self.is_unlimited() {
            return Budget::Unlimited;
        }
        let remaining = (self.limit_per_hour - self.spent_this_hour()).max(Decimal::ZERO);
        Budget::Remaining(remaining)
    }

    /// Hour buckets currently held, oldest first.
    pub fn buckets(&self) -> impl Iterator<Item = (u64, Decimal)> + '_ {
        self.buckets.iter().map(|(hour, spent)| (*hour, *spent))
    }

    fn prune(&mut self, current_hour: u64) {
        let cutoff = current_hour.saturating_sub(RETAINED_HOURS);
        self.buckets = self.buckets.split_off(&cutoff);
    }
}
