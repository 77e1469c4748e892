//! Core ledger engine implementation.
//!
//! The engine is the only component that writes balances and the transaction
//! log. Each deposit or withdrawal runs inside exactly one unit of work: the
//! balance mutation and the log append either both commit or both vanish.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use multiledger_common::{AccountId, Currency, TransactionId};
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::balance::AccountBalances;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult, UnitOfWorkStage};
use crate::journal::{IntegrityReport, NewTransaction, TransactionRecord, TransactionType};
use crate::metrics::{LedgerMetrics, SharedMetrics};
use crate::store::{Deduction, LedgerStore, UnitOfWork};

/// Kind of movement requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deposit,
    Withdraw,
}

impl Operation {
    /// Log record type written for this operation.
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Operation::Deposit => TransactionType::Credit,
            Operation::Withdraw => TransactionType::Debit,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Deposit => f.write_str("deposit"),
            Operation::Withdraw => f.write_str("withdraw"),
        }
    }
}

/// A validated request to move money into or out of one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    pub account: AccountId,
    pub operation: Operation,
    pub amount: Decimal,
    pub currency: Currency,
    pub reference: String,
    pub description: String,
}

impl Movement {
    pub fn new(account: AccountId, operation: Operation, amount: Decimal, currency: Currency) -> Self {
        Self {
            account,
            operation,
            amount,
            currency,
            reference: String::new(),
            description: String::new(),
        }
    }

    pub fn deposit(account: AccountId, amount: Decimal, currency: Currency) -> Self {
        Self::new(account, Operation::Deposit, amount, currency)
    }

    pub fn withdraw(account: AccountId, amount: Decimal, currency: Currency) -> Self {
        Self::new(account, Operation::Withdraw, amount, currency)
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn entry(&self) -> NewTransaction {
        NewTransaction {
            account_id: self.account,
            kind: self.operation.transaction_type(),
            amount: self.amount,
            currency: self.currency.clone(),
            reference: self.reference.clone(),
            description: self.description.clone(),
        }
    }
}

/// Keeps the in-flight gauge honest even when the caller drops the future.
struct InFlight<'a>(&'a LedgerMetrics);

impl<'a> InFlight<'a> {
    fn open(metrics: &'a LedgerMetrics) -> Self {
        metrics.unit_opened();
        Self(metrics)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.unit_closed();
    }
}

async fn within<T>(deadline: Option<Instant>, fut: impl Future<Output = T>) -> Option<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// The ledger engine manages balances and their audit trail.
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    metrics: SharedMetrics,
    operation_timeout: Option<Duration>,
}

impl LedgerEngine {
    /// Create an engine over `store` with no operation timeout.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            metrics: Arc::new(LedgerMetrics::new()),
            operation_timeout: None,
        }
    }

    /// Create an engine over `store` using the limits in `config`.
    pub fn from_config(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self::new(store).with_operation_timeout(config.operation_timeout)
    }

    /// Bound each deposit or withdrawal. The bound covers opening the unit of
    /// work and its steps; a commit that has started is allowed to finish.
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Credit `amount` to the account and return the new record's ID.
    pub async fn deposit(
        &self,
        account: &AccountId,
        amount: Decimal,
        currency: &Currency,
    ) -> LedgerResult<TransactionId> {
        let record = self
            .execute(Movement::deposit(*account, amount, currency.clone()))
            .await?;
        Ok(record.id)
    }

    /// Debit `amount` from the account if it holds enough, and return the new
    /// record's ID.
    pub async fn withdraw(
        &self,
        account: &AccountId,
        amount: Decimal,
        currency: &Currency,
    ) -> LedgerResult<TransactionId> {
        let record = self
            .execute(Movement::withdraw(*account, amount, currency.clone()))
            .await?;
        Ok(record.id)
    }

    /// Apply one movement atomically and return the committed record.
    #[instrument(
        skip_all,
        fields(
            account = %movement.account,
            operation = %movement.operation,
            amount = %movement.amount,
            currency = %movement.currency,
        )
    )]
    pub async fn execute(&self, movement: Movement) -> LedgerResult<TransactionRecord> {
        if movement.amount <= Decimal::ZERO {
            self.metrics.invalid_amount();
            warn!("Rejected movement with non-positive amount");
            return Err(LedgerError::InvalidAmount(movement.amount));
        }

        let deadline = self.operation_timeout.map(|timeout| Instant::now() + timeout);

        let uow = match within(deadline, self.store.begin()).await {
            Some(Ok(uow)) => uow,
            Some(Err(source)) => {
                self.metrics.unit_aborted();
                warn!(error = %source, "Could not open unit of work");
                return Err(LedgerError::UnitOfWork {
                    stage: UnitOfWorkStage::Begin,
                    source,
                });
            }
            None => {
                self.metrics.timeout();
                warn!("Timed out opening unit of work");
                return Err(self.timed_out());
            }
        };

        let _in_flight = InFlight::open(&self.metrics);
        self.settle(uow, deadline, &movement).await
    }

    async fn settle(
        &self,
        mut uow: Box<dyn UnitOfWork>,
        deadline: Option<Instant>,
        movement: &Movement,
    ) -> LedgerResult<TransactionRecord> {
        let staged = within(deadline, Self::apply(uow.as_mut(), movement)).await;

        let record = match staged {
            Some(Ok(record)) => record,
            Some(Err(err)) => return Err(self.abort(uow, err).await),
            None => return Err(self.abort(uow, self.timed_out()).await),
        };

        if let Err(source) = uow.commit().await {
            self.metrics.unit_aborted();
            warn!(error = %source, "Commit failed, unit of work discarded");
            return Err(LedgerError::UnitOfWork {
                stage: UnitOfWorkStage::Commit,
                source,
            });
        }

        self.metrics.committed(record.kind);
        info!(transaction_id = %record.id, "Movement committed");
        Ok(record)
    }

    async fn apply(uow: &mut dyn UnitOfWork, movement: &Movement) -> LedgerResult<TransactionRecord> {
        match movement.operation {
            Operation::Deposit => {
                uow.increase_balance(&movement.account, &movement.currency, movement.amount)
                    .await
                    .map_err(LedgerError::at(UnitOfWorkStage::Increase))?;
            }
            Operation::Withdraw => {
                let deduction = uow
                    .decrease_balance_if_sufficient(
                        &movement.account,
                        &movement.currency,
                        movement.amount,
                    )
                    .await
                    .map_err(LedgerError::at(UnitOfWorkStage::Decrease))?;

                if deduction == Deduction::NotMatched {
                    return Err(LedgerError::InsufficientBalance {
                        account: movement.account,
                        currency: movement.currency.clone(),
                        requested: movement.amount,
                    });
                }
            }
        }

        uow.append_transaction(movement.entry())
            .await
            .map_err(LedgerError::at(UnitOfWorkStage::Append))
    }

    /// Abort `uow` and hand back the error the caller should see.
    async fn abort(&self, uow: Box<dyn UnitOfWork>, cause: LedgerError) -> LedgerError {
        match &cause {
            LedgerError::InsufficientBalance { .. } => self.metrics.insufficient_balance(),
            LedgerError::Timeout(_) => self.metrics.timeout(),
            _ => self.metrics.unit_aborted(),
        }

        if let Err(source) = uow.abort().await {
            error!(error = %source, cause = %cause, "Abort failed");
            return LedgerError::UnitOfWork {
                stage: UnitOfWorkStage::Abort,
                source,
            };
        }

        if cause.is_rejection() {
            warn!(reason = %cause, "Movement rejected");
        } else {
            warn!(error = %cause, "Unit of work aborted");
        }
        cause
    }

    fn timed_out(&self) -> LedgerError {
        LedgerError::Timeout(self.operation_timeout.unwrap_or_default())
    }

    /// Current balances of an account. An account without balances yields an
    /// empty list.
    #[instrument(skip_all, fields(account = %account))]
    pub async fn get_balances(&self, account: &AccountId) -> LedgerResult<AccountBalances> {
        let balances = self
            .store
            .balances(account)
            .await
            .map_err(LedgerError::StoreUnavailable)?;

        Ok(AccountBalances::new(*account, &balances))
    }

    /// Committed records of an account, newest first.
    #[instrument(skip_all, fields(account = %account))]
    pub async fn transactions(&self, account: &AccountId) -> LedgerResult<Vec<TransactionRecord>> {
        self.store
            .transactions(account)
            .await
            .map_err(LedgerError::StoreUnavailable)
    }

    /// Compare each stored balance with the signed sum of its records.
    ///
    /// Balances and records are read separately, so the result is only
    /// meaningful while no writes for the account are in flight.
    #[instrument(skip_all, fields(account = %account))]
    pub async fn verify_integrity(&self, account: &AccountId) -> LedgerResult<IntegrityReport> {
        let balances = self
            .store
            .balances(account)
            .await
            .map_err(LedgerError::StoreUnavailable)?;
        let records = self.transactions(account).await?;

        let report = IntegrityReport::reconcile(*account, &balances, &records)
            .map_err(LedgerError::StoreUnavailable)?;
        if !report.is_consistent() {
            warn!(mismatches = report.mismatches.len(), "Balance drift detected");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{FailurePoint, MemoryLedgerStore};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use tokio_test::assert_ok;

    fn create_test_engine() -> (LedgerEngine, MemoryLedgerStore) {
        let store = MemoryLedgerStore::new();
        let engine = LedgerEngine::new(Arc::new(store.clone()));
        (engine, store)
    }

    async fn assert_untouched(engine: &LedgerEngine, store: &MemoryLedgerStore, account: &AccountId) {
        assert!(engine.get_balances(account).await.unwrap().is_empty());
        assert_eq!(store.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_balance_walkthrough() {
        let (engine, _store) = create_test_engine();
        let account = AccountId::new();
        let usd = Currency::usd();
        let eur = Currency::eur();

        assert_ok!(engine.deposit(&account, dec!(100), &usd).await);
        let view = engine.get_balances(&account).await.unwrap();
        assert_eq!(view.balances.len(), 1);
        assert_eq!(view.amount_of(&usd), dec!(100));

        assert_ok!(engine.deposit(&account, dec!(50), &eur).await);
        let view = engine.get_balances(&account).await.unwrap();
        assert_eq!(view.balances.len(), 2);
        assert_eq!(view.amount_of(&usd), dec!(100));
        assert_eq!(view.amount_of(&eur), dec!(50));

        assert_ok!(engine.withdraw(&account, dec!(30), &usd).await);
        assert_eq!(engine.get_balances(&account).await.unwrap().amount_of(&usd), dec!(70));

        let err = engine.withdraw(&account, dec!(1000), &usd).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(engine.get_balances(&account).await.unwrap().amount_of(&usd), dec!(70));
    }

    #[tokio::test]
    async fn test_deposit_writes_one_credit_record() {
        let (engine, _store) = create_test_engine();
        let account = AccountId::new();

        let id = engine.deposit(&account, dec!(12.34), &Currency::gbp()).await.unwrap();

        let records = engine.transactions(&account).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, id);
        assert_eq!(record.kind, TransactionType::Credit);
        assert_eq!(record.amount, dec!(12.34));
        assert_eq!(record.currency, Currency::gbp());
        assert_eq!(record.status, crate::journal::TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_withdraw_writes_one_debit_record() {
        let (engine, _store) = create_test_engine();
        let account = AccountId::new();
        engine.deposit(&account, dec!(10), &Currency::usd()).await.unwrap();

        let id = engine.withdraw(&account, dec!(10), &Currency::usd()).await.unwrap();

        let records = engine.transactions(&account).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].kind, TransactionType::Debit);
        assert_eq!(records[0].amount, dec!(10));
        assert_eq!(
            engine.get_balances(&account).await.unwrap().amount_of(&Currency::usd()),
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn test_non_positive_amounts_are_rejected() {
        let (engine, store) = create_test_engine();
        let account = AccountId::new();

        for amount in [Decimal::ZERO, dec!(-1), dec!(-0.01)] {
            let err = engine.deposit(&account, amount, &Currency::usd()).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(a) if a == amount));

            let err = engine.withdraw(&account, amount, &Currency::usd()).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)));
        }

        assert_untouched(&engine, &store, &account).await;
        assert_eq!(engine.metrics().snapshot().invalid_amount, 6);
    }

    #[tokio::test]
    async fn test_withdraw_from_unknown_currency_is_insufficient() {
        let (engine, store) = create_test_engine();
        let account = AccountId::new();

        let err = engine.withdraw(&account, dec!(1), &Currency::jpy()).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { ref currency, .. } if *currency == Currency::jpy()
        ));
        assert_untouched(&engine, &store, &account).await;
        assert_eq!(engine.metrics().snapshot().insufficient_balance, 1);
    }

    #[tokio::test]
    async fn test_insufficient_withdraw_leaves_no_record() {
        let (engine, store) = create_test_engine();
        let account = AccountId::new();
        engine.deposit(&account, dec!(5), &Currency::usd()).await.unwrap();

        let err = engine.withdraw(&account, dec!(5.01), &Currency::usd()).await.unwrap_err();

        assert!(err.is_rejection());
        assert_eq!(store.transaction_count().await, 1);
        assert_eq!(
            engine.get_balances(&account).await.unwrap().amount_of(&Currency::usd()),
            dec!(5)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_withdrawals_drain_exactly_to_zero() {
        let (engine, store) = create_test_engine();
        let engine = Arc::new(engine);
        let account = AccountId::new();
        let n = 50;
        engine.deposit(&account, Decimal::from(n * 10), &Currency::usd()).await.unwrap();

        let handles: Vec<_> = (0..n)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.withdraw(&account, dec!(10), &Currency::usd()).await })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            assert!(result.unwrap().is_ok());
        }

        let view = engine.get_balances(&account).await.unwrap();
        assert_eq!(view.amount_of(&Currency::usd()), Decimal::ZERO);
        assert_eq!(store.transaction_count().await, n as usize + 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_oversubscribed_withdrawals_never_go_negative() {
        let (engine, _store) = create_test_engine();
        let engine = Arc::new(engine);
        let account = AccountId::new();
        engine.deposit(&account, dec!(100), &Currency::eur()).await.unwrap();

        let handles: Vec<_> = (0..40)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.withdraw(&account, dec!(5), &Currency::eur()).await })
            })
            .collect();

        let mut succeeded = 0;
        let mut rejected = 0;
        for result in futures::future::join_all(handles).await {
            match result.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::InsufficientBalance { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 20);
        assert_eq!(rejected, 20);
        assert_eq!(
            engine.get_balances(&account).await.unwrap().amount_of(&Currency::eur()),
            Decimal::ZERO
        );
        assert!(engine.verify_integrity(&account).await.unwrap().is_consistent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deposits_are_all_applied() {
        let (engine, _store) = create_test_engine();
        let engine = Arc::new(engine);
        let account = AccountId::new();

        let handles: Vec<_> = (1..=30)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine.deposit(&account, Decimal::from(i), &Currency::usd()).await
                })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            assert!(result.unwrap().is_ok());
        }

        assert_eq!(
            engine.get_balances(&account).await.unwrap().amount_of(&Currency::usd()),
            Decimal::from(465)
        );
        assert_eq!(engine.metrics().snapshot().deposits_committed, 30);
    }

    #[tokio::test]
    async fn test_append_failure_rolls_back_balance() {
        let (engine, store) = create_test_engine();
        let account = AccountId::new();
        store.fail_at(FailurePoint::Append);

        let err = engine.deposit(&account, dec!(100), &Currency::usd()).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::UnitOfWork { stage: UnitOfWorkStage::Append, .. }
        ));
        store.clear_faults();
        assert_untouched(&engine, &store, &account).await;
        assert_eq!(engine.metrics().snapshot().units_aborted, 1);
    }

    #[tokio::test]
    async fn test_append_failure_restores_withdrawn_funds() {
        let (engine, store) = create_test_engine();
        let account = AccountId::new();
        engine.deposit(&account, dec!(100), &Currency::usd()).await.unwrap();
        store.fail_at(FailurePoint::Append);

        let err = engine.withdraw(&account, dec!(40), &Currency::usd()).await.unwrap_err();

        assert!(err.is_retryable());
        store.clear_faults();
        assert_eq!(
            engine.get_balances(&account).await.unwrap().amount_of(&Currency::usd()),
            dec!(100)
        );
        assert_eq!(store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_store_failures_map_to_stages() {
        let cases = [
            (FailurePoint::Begin, UnitOfWorkStage::Begin),
            (FailurePoint::Increase, UnitOfWorkStage::Increase),
            (FailurePoint::Commit, UnitOfWorkStage::Commit),
        ];

        for (point, expected) in cases {
            let (engine, store) = create_test_engine();
            let account = AccountId::new();
            store.fail_at(point);

            match engine.deposit(&account, dec!(1), &Currency::usd()).await {
                Err(LedgerError::UnitOfWork { stage, .. }) => assert_eq!(stage, expected),
                other => panic!("expected unit of work failure, got {other:?}"),
            }

            store.clear_faults();
            assert_untouched(&engine, &store, &account).await;
        }
    }

    #[tokio::test]
    async fn test_overflowing_deposit_is_aborted() {
        let (engine, store) = create_test_engine();
        let account = AccountId::new();
        assert_ok!(engine.deposit(&account, Decimal::MAX, &Currency::usd()).await);

        let err = engine
            .deposit(&account, Decimal::MAX, &Currency::usd())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::UnitOfWork {
                stage: UnitOfWorkStage::Increase,
                source: StoreError::Overflow(_),
            }
        ));
        assert_eq!(
            engine.get_balances(&account).await.unwrap().amount_of(&Currency::usd()),
            Decimal::MAX
        );
        assert_eq!(store.transaction_count().await, 1);
        assert!(engine.verify_integrity(&account).await.unwrap().is_consistent());
        assert_eq!(engine.metrics().snapshot().units_in_flight, 0);
    }

    #[tokio::test]
    async fn test_decrease_failure_is_not_insufficient_balance() {
        let (engine, store) = create_test_engine();
        let account = AccountId::new();
        engine.deposit(&account, dec!(10), &Currency::usd()).await.unwrap();
        store.fail_at(FailurePoint::Decrease);

        let err = engine.withdraw(&account, dec!(1), &Currency::usd()).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::UnitOfWork { stage: UnitOfWorkStage::Decrease, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_abort_is_reported() {
        let (engine, store) = create_test_engine();
        let account = AccountId::new();
        store.fail_at(FailurePoint::Append);
        store.fail_at(FailurePoint::Abort);

        let err = engine.deposit(&account, dec!(1), &Currency::usd()).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::UnitOfWork { stage: UnitOfWorkStage::Abort, .. }
        ));
        store.clear_faults();
        assert_untouched(&engine, &store, &account).await;
    }

    #[tokio::test]
    async fn test_timeout_aborts_unit_of_work() {
        let (engine, store) = create_test_engine();
        let engine = engine.with_operation_timeout(Some(Duration::from_millis(20)));
        let account = AccountId::new();
        store.delay_steps(Duration::from_millis(200));

        let err = engine.deposit(&account, dec!(1), &Currency::usd()).await.unwrap_err();

        assert!(matches!(err, LedgerError::Timeout(d) if d == Duration::from_millis(20)));
        store.clear_faults();
        assert_untouched(&engine, &store, &account).await;

        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.units_in_flight, 0);
    }

    #[tokio::test]
    async fn test_cancelled_call_leaves_no_partial_write() {
        let (engine, store) = create_test_engine();
        let account = AccountId::new();
        store.delay_steps(Duration::from_millis(200));

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            engine.deposit(&account, dec!(1), &Currency::usd()),
        )
        .await;

        assert!(outcome.is_err());
        store.clear_faults();
        assert_untouched(&engine, &store, &account).await;
        assert_eq!(engine.metrics().snapshot().units_in_flight, 0);
    }

    #[tokio::test]
    async fn test_read_failure_is_store_unavailable() {
        let (engine, store) = create_test_engine();
        store.fail_at(FailurePoint::Read);

        let err = engine.get_balances(&AccountId::new()).await.unwrap_err();

        assert!(matches!(err, LedgerError::StoreUnavailable(_)));
        assert_eq!(err.error_code(), "STORE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_execute_keeps_reference_and_description() {
        let (engine, _store) = create_test_engine();
        let account = AccountId::new();

        let record = engine
            .execute(
                Movement::deposit(account, dec!(25), Currency::usd())
                    .with_reference("INV-2024-001")
                    .with_description("invoice settlement"),
            )
            .await
            .unwrap();

        let stored = &engine.transactions(&account).await.unwrap()[0];
        assert_eq!(stored, &record);
        assert_eq!(stored.reference, "INV-2024-001");
        assert_eq!(stored.description, "invoice settlement");
    }

    #[tokio::test]
    async fn test_accounts_are_isolated() {
        let (engine, _store) = create_test_engine();
        let alice = AccountId::new();
        let bob = AccountId::new();

        engine.deposit(&alice, dec!(10), &Currency::usd()).await.unwrap();

        assert!(engine.get_balances(&bob).await.unwrap().is_empty());
        assert!(engine.withdraw(&bob, dec!(1), &Currency::usd()).await.is_err());
        assert!(engine.transactions(&bob).await.unwrap().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Deposit(u32, usize),
        Withdraw(u32, usize),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            (1u32..500, 0usize..3).prop_map(|(a, c)| Step::Deposit(a, c)),
            (1u32..500, 0usize..3).prop_map(|(a, c)| Step::Withdraw(a, c)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_balances_match_signed_record_sums(steps in prop::collection::vec(step_strategy(), 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let currencies = [Currency::usd(), Currency::eur(), Currency::jpy()];
                let (engine, _store) = create_test_engine();
                let account = AccountId::new();
                let mut model = [Decimal::ZERO; 3];

                for step in &steps {
                    match step {
                        Step::Deposit(amount, c) => {
                            let amount = Decimal::from(*amount) / dec!(100);
                            engine.deposit(&account, amount, &currencies[*c]).await.unwrap();
                            model[*c] += amount;
                        }
                        Step::Withdraw(amount, c) => {
                            let amount = Decimal::from(*amount) / dec!(100);
                            match engine.withdraw(&account, amount, &currencies[*c]).await {
                                Ok(_) => model[*c] -= amount,
                                Err(LedgerError::InsufficientBalance { .. }) => {
                                    assert!(model[*c] < amount);
                                }
                                Err(other) => panic!("unexpected error: {other}"),
                            }
                        }
                    }
                }

                let view = engine.get_balances(&account).await.unwrap();
                for (i, currency) in currencies.iter().enumerate() {
                    assert_eq!(view.amount_of(currency), model[i]);
                    assert!(view.amount_of(currency) >= Decimal::ZERO);
                }
                assert!(engine.verify_integrity(&account).await.unwrap().is_consistent());
            });
        }
    }
}
