//! Append-only payment ledger.
//!
//! [`MetricsTracker`] keeps every [`PaymentRecord`] in arrival order and
//! maintains [`PaymentMetrics`] incrementally. Records are never mutated or
//! removed.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::timestamp::{Clock, SystemClock, UnixTimestamp};

/// Direction of a payment relative to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Paid by this client.
    Sent,
    /// Paid to this client.
    Received,
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    /// Transaction signature, empty when unknown.
    pub signature: String,
    /// When the entry was appended.
    pub timestamp: UnixTimestamp,
    /// Amount moved.
    pub amount: Decimal,
    /// Asset moved.
    pub asset: String,
    /// Sent or received.
    pub direction: Direction,
    /// The other party: payee for sent payments, payer for received ones.
    pub counterpart: String,
}

/// Aggregates derived from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMetrics {
    /// Sum of sent amounts.
    pub total_spent: Decimal,
    /// Sum of received amounts.
    pub total_earned: Decimal,
    /// `total_earned - total_spent`.
    pub net_profit: Decimal,
    /// Number of records in either direction.
    pub transaction_count: u64,
    /// `total_spent / transaction_count`, zero when there are no records.
    pub average_cost_per_transaction: Decimal,
}

/// Details of a payment to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    /// Transaction signature, empty when unknown.
    pub signature: String,
    /// Amount moved.
    pub amount: Decimal,
    /// Asset moved.
    pub asset: String,
    /// Sent or received.
    pub direction: Direction,
    /// The other party.
    pub counterpart: String,
}

/// Payment ledger with running aggregates.
#[derive(Clone)]
pub struct MetricsTracker {
    records: Vec<PaymentRecord>,
    metrics: PaymentMetrics,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MetricsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsTracker")
            .field("records", &self.records.len())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsTracker {
    /// Creates an empty ledger using wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            metrics: PaymentMetrics::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used to stamp records.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Appends a record and updates the aggregates.
    pub fn track(&mut self, payment: NewPayment) -> &PaymentRecord {
        let m = &mut self.metrics;
        match payment.direction {
            Direction::Sent => m.total_spent += payment.amount,
            Direction::Received => m.total_earned += payment.amount,
        }
        m.net_profit = m.total_earned - m.total_spent;
        m.transaction_count += 1;
        m.average_cost_per_transaction = m
            .total_spent
            .checked_div(Decimal::from(m.transaction_count))
            .unwrap_or(Decimal::ZERO);

        #[cfg(feature = "telemetry")]
        tracing::debug!(
            direction = ?payment.direction,
            amount = %payment.amount,
            asset = %payment.asset,
            "Ledger entry appended"
        );

        let index = self.records.len();
        self.records.push(PaymentRecord {
            signature: payment.signature,
            timestamp: self.clock.now(),
            amount: payment.amount,
            asset: payment.asset,
            direction: payment.direction,
            counterpart: payment.counterpart,
        });
        &self.records[index]
    }

    /// Current aggregates.
    #[must_use]
    pub const fn metrics(&self) -> PaymentMetrics {
        self.metrics
    }

    /// Records newest-first, capped to `limit` entries; `0` means all.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<PaymentRecord> {
        let take = if limit == 0 { self.records.len() } else { limit };
        self.records.iter().rev().take(take).cloned().collect()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no payment has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
