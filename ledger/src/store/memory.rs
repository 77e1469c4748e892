//! In-process ledger store.
//!
//! A unit of work takes the state lock for its whole lifetime, so sessions
//! are serialized. Writes are staged inside the session and applied to the
//! shared state only on commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use multiledger_common::{AccountId, Currency};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::balance::Balance;
use crate::error::{StoreError, StoreResult};
use crate::journal::{NewTransaction, TransactionRecord};
use crate::store::{Deduction, LedgerStore, UnitOfWork};

type BalanceKey = (AccountId, Currency);

/// Store operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Begin,
    Increase,
    Decrease,
    Append,
    Commit,
    Abort,
    Read,
}

#[derive(Debug, Default)]
struct MemoryState {
    balances: HashMap<BalanceKey, Balance>,
    transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Default)]
struct FaultPlan {
    armed: HashSet<FailurePoint>,
    step_delay: Option<Duration>,
}

impl FaultPlan {
    fn check(&self, point: FailurePoint) -> StoreResult<()> {
        if self.armed.contains(&point) {
            return Err(StoreError::Unavailable(format!(
                "injected failure at {point:?}"
            )));
        }
        Ok(())
    }
}

/// Ledger store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<AsyncMutex<MemoryState>>,
    faults: Arc<Mutex<FaultPlan>>,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call that reaches `point` fail until cleared.
    pub fn fail_at(&self, point: FailurePoint) {
        self.faults.lock().armed.insert(point);
    }

    /// Disarm all injected failures and delays.
    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock();
        faults.armed.clear();
        faults.step_delay = None;
    }

    /// Sleep for `delay` before each step inside a unit of work.
    pub fn delay_steps(&self, delay: Duration) {
        self.faults.lock().step_delay = Some(delay);
    }

    /// Number of committed log records across all accounts.
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }

    fn check(&self, point: FailurePoint) -> StoreResult<()> {
        self.faults.lock().check(point)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        self.check(FailurePoint::Begin)?;
        let guard = self.state.clone().lock_owned().await;

        Ok(Box::new(MemoryUnitOfWork {
            state: guard,
            faults: self.faults.clone(),
            staged_balances: HashMap::new(),
            staged_transactions: Vec::new(),
        }))
    }

    async fn balances(&self, account: &AccountId) -> StoreResult<Vec<Balance>> {
        self.check(FailurePoint::Read)?;
        let state = self.state.lock().await;

        let mut balances: Vec<Balance> = state
            .balances
            .values()
            .filter(|b| &b.account_id == account)
            .cloned()
            .collect();
        balances.sort_by(|a, b| a.currency.cmp(&b.currency));

        Ok(balances)
    }

    async fn transactions(&self, account: &AccountId) -> StoreResult<Vec<TransactionRecord>> {
        self.check(FailurePoint::Read)?;
        let state = self.state.lock().await;

        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| &t.account_id == account)
            .cloned()
            .collect())
    }
}

struct MemoryUnitOfWork {
    state: OwnedMutexGuard<MemoryState>,
    faults: Arc<Mutex<FaultPlan>>,
    staged_balances: HashMap<BalanceKey, Balance>,
    staged_transactions: Vec<TransactionRecord>,
}

impl MemoryUnitOfWork {
    async fn step(&self, point: FailurePoint) -> StoreResult<()> {
        let delay = {
            let faults = self.faults.lock();
            faults.check(point)?;
            faults.step_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Current view of a balance: staged value first, then committed state.
    fn current(&self, key: &BalanceKey) -> Option<Balance> {
        self.staged_balances
            .get(key)
            .or_else(|| self.state.balances.get(key))
            .cloned()
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn increase_balance(
        &mut self,
        account: &AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> StoreResult<Balance> {
        self.step(FailurePoint::Increase).await?;

        let key = (*account, currency.clone());
        let mut balance = self
            .current(&key)
            .unwrap_or_else(|| Balance::zero(*account, currency.clone()));
        balance.credit(amount)?;

        debug!(account = %account, currency = %currency, amount = %balance.amount, "Staged balance increase");
        self.staged_balances.insert(key, balance.clone());
        Ok(balance)
    }

    async fn decrease_balance_if_sufficient(
        &mut self,
        account: &AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> StoreResult<Deduction> {
        self.step(FailurePoint::Decrease).await?;

        let key = (*account, currency.clone());
        let mut balance = match self.current(&key) {
            Some(balance) if balance.has_sufficient_funds(amount) => balance,
            _ => return Ok(Deduction::NotMatched),
        };
        balance.debit(amount);

        debug!(account = %account, currency = %currency, amount = %balance.amount, "Staged balance decrease");
        self.staged_balances.insert(key, balance.clone());
        Ok(Deduction::Applied(balance))
    }

    async fn append_transaction(&mut self, entry: NewTransaction) -> StoreResult<TransactionRecord> {
        self.step(FailurePoint::Append).await?;

        let record = TransactionRecord::completed(entry);
        self.staged_transactions.push(record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.faults.lock().check(FailurePoint::Commit)?;

        let MemoryUnitOfWork {
            mut state,
            staged_balances,
            staged_transactions,
            ..
        } = *self;
        state.balances.extend(staged_balances);
        state.transactions.extend(staged_transactions);
        Ok(())
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        // Staged writes are dropped together with the session either way.
        self.faults.lock().check(FailurePoint::Abort)
    }
}
