//! Transaction log records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use multiledger_common::{time, AccountId, Currency, Timestamp, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::balance::Balance;
use crate::error::{StoreError, StoreResult};

/// Direction of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money added to the account.
    Credit,
    /// Money taken from the account.
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(TransactionType::Credit),
            "debit" => Ok(TransactionType::Debit),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// Lifecycle status of a transaction record.
///
/// The engine only writes records once they are final, so everything it
/// produces is `Completed`. The other states exist for records written by
/// other tools sharing the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// Input for appending a record to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub kind: TransactionType,
    /// Always positive; direction lives in `kind`.
    pub amount: Decimal,
    pub currency: Currency,
    pub reference: String,
    pub description: String,
}

/// Immutable record of one committed movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique record ID.
    pub id: TransactionId,
    /// Account affected.
    pub account_id: AccountId,
    /// Credit or debit.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Amount moved (always positive).
    pub amount: Decimal,
    /// Currency moved.
    pub currency: Currency,
    pub status: TransactionStatus,
    /// Caller supplied reference, possibly empty.
    pub reference: String,
    /// Caller supplied description, possibly empty.
    pub description: String,
    /// When the movement happened.
    pub transaction_date: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TransactionRecord {
    /// Build the completed record for `entry` with a fresh ID.
    pub fn completed(entry: NewTransaction) -> Self {
        let now = time::now();
        Self {
            id: TransactionId::new(),
            account_id: entry.account_id,
            kind: entry.kind,
            amount: entry.amount,
            currency: entry.currency,
            status: TransactionStatus::Completed,
            reference: entry.reference,
            description: entry.description,
            transaction_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get signed amount (positive for credit, negative for debit).
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionType::Credit => self.amount,
            TransactionType::Debit => -self.amount,
        }
    }
}

/// Signed sum of completed records per currency.
pub fn signed_totals<'a>(
    records: impl IntoIterator<Item = &'a TransactionRecord>,
) -> StoreResult<BTreeMap<Currency, Decimal>> {
    let mut totals: BTreeMap<Currency, Decimal> = BTreeMap::new();

    for record in records {
        if record.status != TransactionStatus::Completed {
            continue;
        }
        let total = totals.entry(record.currency.clone()).or_insert(Decimal::ZERO);
        *total = total.checked_add(record.signed_amount()).ok_or_else(|| {
            StoreError::Overflow(format!(
                "{} total of account {} at record {}",
                record.currency, record.account_id, record.id
            ))
        })?;
    }

    Ok(totals)
}

/// A currency whose stored balance disagrees with its transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityMismatch {
    pub currency: Currency,
    /// Amount held in the balance record (zero when there is none).
    pub stored: Decimal,
    /// Signed sum of committed records.
    pub expected: Decimal,
}

/// Result of reconciling an account's balances against its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub account_id: AccountId,
    pub currencies_checked: usize,
    pub mismatches: Vec<IntegrityMismatch>,
}

impl IntegrityReport {
    /// Compare stored balances with the signed totals of `records`.
    pub fn reconcile(
        account_id: AccountId,
        balances: &[Balance],
        records: &[TransactionRecord],
    ) -> StoreResult<Self> {
        let expected = signed_totals(records)?;
        let mut stored: BTreeMap<Currency, Decimal> = BTreeMap::new();
        for balance in balances {
            stored.insert(balance.currency.clone(), balance.amount);
        }

        let mut currencies: Vec<&Currency> = stored.keys().chain(expected.keys()).collect();
        currencies.sort();
        currencies.dedup();

        let mismatches = currencies
            .iter()
            .filter_map(|currency| {
                let held = stored.get(*currency).copied().unwrap_or(Decimal::ZERO);
                let sum = expected.get(*currency).copied().unwrap_or(Decimal::ZERO);
                (held != sum).then(|| IntegrityMismatch {
                    currency: (*currency).clone(),
                    stored: held,
                    expected: sum,
                })
            })
            .collect();

        Ok(Self {
            account_id,
            currencies_checked: currencies.len(),
            mismatches,
        })
    }

    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}
