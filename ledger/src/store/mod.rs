//! Backing store abstraction.
//!
//! A [`LedgerStore`] hands out [`UnitOfWork`] sessions. Every balance mutation
//! and every log append happens inside one, and nothing a session writes is
//! visible to anyone else until [`UnitOfWork::commit`] returns. Dropping a
//! session without committing aborts it.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use multiledger_common::{AccountId, Currency};
use rust_decimal::Decimal;
use tracing::info;

use crate::balance::Balance;
use crate::config::{LedgerConfig, StoreBackend};
use crate::error::StoreResult;
use crate::journal::{NewTransaction, TransactionRecord};

pub use memory::{FailurePoint, MemoryLedgerStore};
pub use postgres::PgLedgerStore;

/// Outcome of a conditional deduct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deduction {
    /// The record held enough funds and was decremented.
    Applied(Balance),
    /// No record for the key, or not enough funds. Nothing changed.
    NotMatched,
}

/// One atomic session against the store.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Add `amount` to the (account, currency) balance, creating the record
    /// when it does not exist yet.
    async fn increase_balance(
        &mut self,
        account: &AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> StoreResult<Balance>;

    /// Subtract `amount` only if the stored balance covers it. The sufficiency
    /// check and the write are a single indivisible store operation.
    async fn decrease_balance_if_sufficient(
        &mut self,
        account: &AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> StoreResult<Deduction>;

    /// Append a completed record to the transaction log.
    async fn append_transaction(&mut self, entry: NewTransaction) -> StoreResult<TransactionRecord>;

    /// Make every write of this session durable and visible.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard every write of this session.
    async fn abort(self: Box<Self>) -> StoreResult<()>;
}

/// Storage for balances and the transaction log.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Open a new unit of work.
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    /// All balance records of an account, ordered by currency.
    async fn balances(&self, account: &AccountId) -> StoreResult<Vec<Balance>>;

    /// All log records of an account, newest first.
    async fn transactions(&self, account: &AccountId) -> StoreResult<Vec<TransactionRecord>>;
}

/// Open the store selected by `config`. PostgreSQL stores are migrated
/// before they are returned.
pub async fn open_store(config: &LedgerConfig) -> StoreResult<Arc<dyn LedgerStore>> {
    match config.store {
        StoreBackend::Memory => {
            info!("Using in-memory ledger store");
            Ok(Arc::new(MemoryLedgerStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PgLedgerStore::connect(&config.database).await?;
            store.migrate().await?;
            info!("Using PostgreSQL ledger store");
            Ok(Arc::new(store))
        }
    }
}
