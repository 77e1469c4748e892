//! Ledger error types.

use std::fmt;
use std::time::Duration;

use multiledger_common::{AccountId, Currency};
use rust_decimal::Decimal;
use thiserror::Error;

/// Failures raised by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Driver or connection level failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The store refused or could not serve the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A persisted row could not be mapped back to a record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// An amount left the representable decimal range.
    #[error("Amount overflow: {0}")]
    Overflow(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Step of a unit of work at which a store failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkStage {
    Begin,
    Increase,
    Decrease,
    Append,
    Commit,
    Abort,
}

impl fmt::Display for UnitOfWorkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitOfWorkStage::Begin => "begin",
            UnitOfWorkStage::Increase => "balance increase",
            UnitOfWorkStage::Decrease => "balance decrease",
            UnitOfWorkStage::Append => "transaction append",
            UnitOfWorkStage::Commit => "commit",
            UnitOfWorkStage::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// Errors returned by the ledger engine.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Amount was zero or negative. Nothing was written.
    #[error("Invalid amount {0}: must be greater than 0")]
    InvalidAmount(Decimal),

    /// The conditional deduct matched no record holding enough funds.
    #[error("Insufficient balance: account {account} cannot cover {requested} {currency}")]
    InsufficientBalance {
        account: AccountId,
        currency: Currency,
        requested: Decimal,
    },

    /// The unit of work could not be opened, a step inside it failed, or it
    /// could not be committed or aborted.
    #[error("Unit of work failed during {stage}: {source}")]
    UnitOfWork {
        stage: UnitOfWorkStage,
        #[source]
        source: StoreError,
    },

    /// A read outside any unit of work failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The operation did not finish within the configured bound and was aborted.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl LedgerError {
    pub(crate) fn at(stage: UnitOfWorkStage) -> impl FnOnce(StoreError) -> LedgerError {
        move |source| LedgerError::UnitOfWork { stage, source }
    }

    /// Business-rule rejections the caller can fix by changing its input.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount(_) | LedgerError::InsufficientBalance { .. }
        )
    }

    /// Check if this error is retryable. The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::UnitOfWork { .. }
                | LedgerError::StoreUnavailable(_)
                | LedgerError::Timeout(_)
        )
    }

    /// Stable error code for callers that map errors onto a wire format.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::UnitOfWork { .. } => "UNIT_OF_WORK_FAILED",
            LedgerError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            LedgerError::Timeout(_) => "TIMEOUT",
        }
    }
}

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
