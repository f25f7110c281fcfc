//! Budget and ledger state owned by a payment client.
//!
//! [`PaymentState`] bundles the [`SpendingGuard`] and the [`MetricsTracker`].
//! Clients hold it as a [`SharedPaymentState`] so that callers can inject it,
//! inspect it, or share one budget between several clients.

use std::sync::{Arc, Mutex, MutexGuard};

use rust_decimal::Decimal;

use crate::budget::SpendingGuard;
use crate::ledger::MetricsTracker;
use crate::timestamp::Clock;

/// Mutable per-client payment state.
#[derive(Debug, Clone, Default)]
pub struct PaymentState {
    /// Hourly spending budget.
    pub guard: SpendingGuard,
    /// Payment ledger.
    pub tracker: MetricsTracker,
}

impl PaymentState {
    /// Creates state with the given hourly limit; negative means unlimited.
    #[must_use]
    pub fn new(limit_per_hour: Decimal) -> Self {
        Self {
            guard: SpendingGuard::new(limit_per_hour),
            tracker: MetricsTracker::new(),
        }
    }

    /// Uses `clock` for both budget buckets and ledger timestamps.
    #[must_use]
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self {
            guard: self.guard.with_clock(Arc::clone(&clock)),
            tracker: self.tracker.with_clock(clock),
        }
    }

    /// Wraps the state for sharing.
    #[must_use]
    pub fn shared(self) -> SharedPaymentState {
        SharedPaymentState(Arc::new(Mutex::new(self)))
    }
}

/// Lockable handle to a [`PaymentState`].
///
/// The lock is only held for in-memory bookkeeping, never across network or
/// chain calls.
#[derive(Debug, Clone, Default)]
pub struct SharedPaymentState(Arc<Mutex<PaymentState>>);

impl SharedPaymentState {
    /// Locks the state, recovering from poisoning.
    pub fn lock(&self) -> MutexGuard<'_, PaymentState> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl From<PaymentState> for SharedPaymentState {
    fn from(state: PaymentState) -> Self {
        state.shared()
    }
}
