//! Simulation controller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use multiledger_common::{AccountId, Currency, Money};
use multiledger_ledger::{LedgerEngine, LedgerResult, Movement};

use crate::metrics::SimulationMetrics;
use crate::scenario::{Expectation, Scenario, ScenarioStep};

const LOAD_CURRENCIES: [&str; 4] = ["USD", "EUR", "GBP", "JPY"];

/// Drives scenarios against a ledger engine.
pub struct SimulationController {
    engine: Arc<LedgerEngine>,
    /// Random number generator.
    rng: StdRng,
    /// Account labels seen so far.
    accounts: BTreeMap<String, AccountId>,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
}

async fn track<T>(metrics: &RwLock<SimulationMetrics>, started: Instant, result: &LedgerResult<T>) {
    let latency_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    let mut metrics = metrics.write().await;
    match result {
        Ok(_) => metrics.record_commit(latency_us),
        Err(err) if err.is_rejection() => metrics.record_rejection(),
        Err(_) => metrics.record_failure(),
    }
}

fn money(amount: &str, currency: &str) -> anyhow::Result<Money> {
    let currency = Currency::new(currency);
    if !currency.is_well_formed() {
        bail!("Invalid currency code {:?}", currency.code());
    }
    Money::parse(amount, currency.clone())
        .with_context(|| format!("Invalid amount {amount:?} for {currency}"))
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(engine: Arc<LedgerEngine>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            engine,
            rng,
            accounts: BTreeMap::new(),
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
        }
    }

    fn account(&mut self, label: &str) -> AccountId {
        *self
            .accounts
            .entry(label.to_string())
            .or_insert_with(AccountId::new)
    }

    /// Run every step of a scenario, stopping at the first failed expectation.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        for (index, step) in scenario.steps.iter().enumerate() {
            self.execute_step(step)
                .await
                .with_context(|| format!("Step {} of {} failed", index + 1, scenario.name))?;
        }

        Ok(())
    }

    async fn execute_step(&mut self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Deposit {
                account,
                amount,
                currency,
                expect,
            } => {
                let account = self.account(account);
                let money = money(amount, currency)?;
                self.single(Movement::deposit(account, money.value, money.currency), *expect)
                    .await
            }
            ScenarioStep::Withdraw {
                account,
                amount,
                currency,
                expect,
            } => {
                let account = self.account(account);
                let money = money(amount, currency)?;
                self.single(Movement::withdraw(account, money.value, money.currency), *expect)
                    .await
            }
            ScenarioStep::ExpectBalance {
                account,
                currency,
                amount,
            } => {
                let label = account;
                let account = self.account(label);
                let expected = money(amount, currency)?;
                let actual = self
                    .engine
                    .get_balances(&account)
                    .await?
                    .amount_of(&expected.currency);

                if actual != expected.value {
                    bail!("Balance of {label} is {actual} {}, expected {expected}", expected.currency);
                }
                info!("Balance of {} is {}", label, expected);
                Ok(())
            }
            ScenarioStep::WithdrawRace {
                account,
                currency,
                funding,
                amount,
                attempts,
            } => {
                let account = self.account(account);
                let funding = money(funding, currency)?;
                let amount = money(amount, currency)?;
                self.withdraw_race(account, funding, amount, *attempts).await
            }
            ScenarioStep::RandomLoad {
                accounts,
                operations,
                concurrency,
            } => self.random_load(*accounts, *operations, *concurrency).await,
        }
    }

    async fn single(&self, movement: Movement, expect: Expectation) -> anyhow::Result<()> {
        let description = format!(
            "{} {} {}",
            movement.operation, movement.amount, movement.currency
        );

        let started = Instant::now();
        let result = self.engine.execute(movement).await;
        track(&self.metrics, started, &result).await;

        match (result, expect) {
            (Ok(record), Expectation::Committed) => {
                info!("{} committed as {}", description, record.id);
                Ok(())
            }
            (Err(err), Expectation::Rejected) if err.is_rejection() => {
                info!("{} rejected: {}", description, err);
                Ok(())
            }
            (Ok(record), Expectation::Rejected) => {
                bail!("{description} committed as {} but should have been rejected", record.id)
            }
            (Err(err), _) => Err(err).with_context(|| format!("{description} failed")),
        }
    }

    async fn withdraw_race(
        &self,
        account: AccountId,
        funding: Money,
        amount: Money,
        attempts: usize,
    ) -> anyhow::Result<()> {
        if amount.value <= Decimal::ZERO {
            bail!("Race withdrawals need a positive amount, got {amount}");
        }

        self.engine
            .deposit(&account, funding.value, &funding.currency)
            .await
            .context("Funding deposit failed")?;

        let handles: Vec<_> = (0..attempts)
            .map(|_| {
                let engine = self.engine.clone();
                let metrics = self.metrics.clone();
                let amount = amount.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result = engine.withdraw(&account, amount.value, &amount.currency).await;
                    track(&metrics, started, &result).await;
                    result
                })
            })
            .collect();

        let mut committed: u64 = 0;
        for result in futures::future::join_all(handles).await {
            match result? {
                Ok(_) => committed += 1,
                Err(err) if err.is_rejection() => {}
                Err(err) => return Err(err).context("Withdrawal failed outside the balance check"),
            }
        }

        let coverable = (funding.value / amount.value).floor();
        let expected = coverable.min(Decimal::from(attempts as u64));
        if Decimal::from(committed) != expected {
            bail!("{committed} withdrawals committed, expected {expected}");
        }

        info!(
            "{} of {} concurrent withdrawals of {} committed",
            committed, attempts, amount
        );
        Ok(())
    }

    fn random_movement(&mut self, pool: &[AccountId]) -> Movement {
        let account = pool[self.rng.gen_range(0..pool.len())];
        let currency = Currency::new(LOAD_CURRENCIES[self.rng.gen_range(0..LOAD_CURRENCIES.len())]);
        let minor_units: i64 = self.rng.gen_range(1..=50_000);
        let amount = Decimal::new(minor_units, currency.decimal_places());

        let movement = if self.rng.gen_bool(0.6) {
            Movement::deposit(account, amount, currency)
        } else {
            Movement::withdraw(account, amount, currency)
        };
        movement.with_reference(format!("load-{minor_units}"))
    }

    async fn random_load(
        &mut self,
        accounts: usize,
        operations: usize,
        concurrency: usize,
    ) -> anyhow::Result<()> {
        if accounts == 0 {
            bail!("Random load needs at least one account");
        }

        let pool: Vec<AccountId> = (0..accounts)
            .map(|i| self.account(&format!("load-{i}")))
            .collect();
        let plan: Vec<Movement> = (0..operations)
            .map(|_| self.random_movement(&pool))
            .collect();

        info!(
            "Generated {} movements over {} accounts",
            plan.len(),
            pool.len()
        );

        let engine = self.engine.clone();
        let metrics = self.metrics.clone();
        stream::iter(plan)
            .map(|movement| {
                let engine = engine.clone();
                let metrics = metrics.clone();
                async move {
                    let started = Instant::now();
                    let result = engine.execute(movement).await;
                    track(&metrics, started, &result).await;
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect::<Vec<()>>()
            .await;

        Ok(())
    }

    /// Check every account this controller touched. Fails on the first drift.
    pub async fn verify_integrity(&self) -> anyhow::Result<usize> {
        for (label, account) in &self.accounts {
            let report = self.engine.verify_integrity(account).await?;
            if !report.is_consistent() {
                for mismatch in &report.mismatches {
                    warn!(
                        "{}: stored {} {} but records sum to {}",
                        label, mismatch.stored, mismatch.currency, mismatch.expected
                    );
                }
                bail!("Account {label} failed integrity verification");
            }
        }

        Ok(self.accounts.len())
    }

    /// Get simulation metrics.
    pub async fn get_metrics(&self) -> SimulationMetrics {
        self.metrics.read().await.clone()
    }
}
