//! Counters for ledger monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::journal::TransactionType;

/// Ledger engine metrics.
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    /// Committed deposits.
    pub deposits_committed: AtomicU64,
    /// Committed withdrawals.
    pub withdrawals_committed: AtomicU64,
    /// Withdrawals rejected for insufficient balance.
    pub insufficient_balance: AtomicU64,
    /// Movements rejected for a non-positive amount.
    pub invalid_amount: AtomicU64,
    /// Units of work aborted because of a store failure.
    pub units_aborted: AtomicU64,
    /// Units of work aborted because the deadline passed.
    pub timeouts: AtomicU64,
    /// Units of work currently open.
    pub units_in_flight: AtomicU64,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn unit_opened(&self) {
        self.units_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unit_closed(&self) {
        self.units_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn committed(&self, kind: TransactionType) {
        match kind {
            TransactionType::Credit => self.deposits_committed.fetch_add(1, Ordering::Relaxed),
            TransactionType::Debit => self.withdrawals_committed.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn insufficient_balance(&self) {
        self.insufficient_balance.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalid_amount(&self) {
        self.invalid_amount.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unit_aborted(&self) {
        self.units_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> LedgerMetricsSnapshot {
        LedgerMetricsSnapshot {
            deposits_committed: self.deposits_committed.load(Ordering::Relaxed),
            withdrawals_committed: self.withdrawals_committed.load(Ordering::Relaxed),
            insufficient_balance: self.insufficient_balance.load(Ordering::Relaxed),
            invalid_amount: self.invalid_amount.load(Ordering::Relaxed),
            units_aborted: self.units_aborted.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            units_in_flight: self.units_in_flight.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP multiledger_deposits_committed Total committed deposits
# TYPE multiledger_deposits_committed counter
multiledger_deposits_committed {}

# HELP multiledger_withdrawals_committed Total committed withdrawals
# TYPE multiledger_withdrawals_committed counter
multiledger_withdrawals_committed {}

# HELP multiledger_insufficient_balance Withdrawals rejected for insufficient balance
# TYPE multiledger_insufficient_balance counter
multiledger_insufficient_balance {}

# HELP multiledger_invalid_amount Movements rejected for a non-positive amount
# TYPE multiledger_invalid_amount counter
multiledger_invalid_amount {}

# HELP multiledger_units_aborted Units of work aborted on store failure
# TYPE multiledger_units_aborted counter
multiledger_units_aborted {}

# HELP multiledger_timeouts Units of work aborted on deadline
# TYPE multiledger_timeouts counter
multiledger_timeouts {}

# HELP multiledger_units_in_flight Units of work currently open
# TYPE multiledger_units_in_flight gauge
multiledger_units_in_flight {}
"#,
            snapshot.deposits_committed,
            snapshot.withdrawals_committed,
            snapshot.insufficient_balance,
            snapshot.invalid_amount,
            snapshot.units_aborted,
            snapshot.timeouts,
            snapshot.units_in_flight,
        )
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerMetricsSnapshot {
    pub deposits_committed: u64,
    pub withdrawals_committed: u64,
    pub insufficient_balance: u64,
    pub invalid_amount: u64,
    pub units_aborted: u64,
    pub timeouts: u64,
    pub units_in_flight: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<LedgerMetrics>;
