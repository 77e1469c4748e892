//! Simulation scenarios.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// What a single deposit or withdrawal step must end in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    #[default]
    Committed,
    Rejected,
}

/// A step in a scenario. Accounts are named by label; the controller maps
/// each label to an account ID the first time it sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Deposit into an account.
    Deposit {
        account: String,
        amount: String,
        currency: String,
        #[serde(default)]
        expect: Expectation,
    },
    /// Withdraw from an account.
    Withdraw {
        account: String,
        amount: String,
        currency: String,
        #[serde(default)]
        expect: Expectation,
    },
    /// Check one balance of an account.
    ExpectBalance {
        account: String,
        currency: String,
        amount: String,
    },
    /// Fund an account, then fire `attempts` withdrawals of `amount` at it
    /// concurrently.
    WithdrawRace {
        account: String,
        currency: String,
        funding: String,
        amount: String,
        attempts: usize,
    },
    /// Random deposits and withdrawals over a pool of accounts.
    RandomLoad {
        accounts: usize,
        operations: usize,
        concurrency: usize,
    },
}

/// Knobs the command line passes to the built-in scenarios.
#[derive(Debug, Clone, Copy)]
pub struct LoadParams {
    pub accounts: usize,
    pub operations: usize,
    pub concurrency: usize,
}

impl Default for LoadParams {
    fn default() -> Self {
        Self {
            accounts: 8,
            operations: 1000,
            concurrency: 16,
        }
    }
}

impl Scenario {
    /// Load a built-in scenario by name.
    pub fn load(name: &str, params: LoadParams) -> anyhow::Result<Self> {
        match name {
            "walkthrough" => Ok(Self::walkthrough()),
            "withdraw-race" => Ok(Self::withdraw_race(params)),
            "random-load" => Ok(Self::random_load(params)),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Read a scenario from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Single account, two currencies, one rejected withdrawal.
    fn walkthrough() -> Self {
        let deposit = |amount: &str, currency: &str| ScenarioStep::Deposit {
            account: "alice".to_string(),
            amount: amount.to_string(),
            currency: currency.to_string(),
            expect: Expectation::Committed,
        };
        let balance = |currency: &str, amount: &str| ScenarioStep::ExpectBalance {
            account: "alice".to_string(),
            currency: currency.to_string(),
            amount: amount.to_string(),
        };

        Self {
            name: "walkthrough".to_string(),
            description: "Deposits in two currencies and an overdrawn withdrawal".to_string(),
            steps: vec![
                deposit("100", "USD"),
                balance("USD", "100"),
                deposit("50", "EUR"),
                balance("USD", "100"),
                balance("EUR", "50"),
                ScenarioStep::Withdraw {
                    account: "alice".to_string(),
                    amount: "30".to_string(),
                    currency: "USD".to_string(),
                    expect: Expectation::Committed,
                },
                balance("USD", "70"),
                ScenarioStep::Withdraw {
                    account: "alice".to_string(),
                    amount: "1000".to_string(),
                    currency: "USD".to_string(),
                    expect: Expectation::Rejected,
                },
                balance("USD", "70"),
                balance("EUR", "50"),
            ],
        }
    }

    /// Twice as many withdrawals as the funding covers.
    fn withdraw_race(params: LoadParams) -> Self {
        let attempts = params.operations.max(2);
        let funding = (attempts / 2) * 10;

        Self {
            name: "withdraw-race".to_string(),
            description: format!("{attempts} concurrent withdrawals of 10 USD against {funding} USD"),
            steps: vec![
                ScenarioStep::WithdrawRace {
                    account: "race".to_string(),
                    currency: "USD".to_string(),
                    funding: funding.to_string(),
                    amount: "10".to_string(),
                    attempts,
                },
                ScenarioStep::ExpectBalance {
                    account: "race".to_string(),
                    currency: "USD".to_string(),
                    amount: "0".to_string(),
                },
            ],
        }
    }

    fn random_load(params: LoadParams) -> Self {
        Self {
            name: "random-load".to_string(),
            description: format!(
                "{} random movements over {} accounts, {} at a time",
                params.operations, params.accounts, params.concurrency
            ),
            steps: vec![ScenarioStep::RandomLoad {
                accounts: params.accounts,
                operations: params.operations,
                concurrency: params.concurrency,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_builtin_scenarios() {
        for name in ["walkthrough", "withdraw-race", "random-load"] {
            let scenario = Scenario::load(name, LoadParams::default()).unwrap();
            assert_eq!(scenario.name, name);
            assert!(!scenario.steps.is_empty());
        }
        assert!(Scenario::load("high-volume", LoadParams::default()).is_err());
    }

    #[test]
    fn test_withdraw_race_is_oversubscribed() {
        let params = LoadParams {
            operations: 7,
            ..LoadParams::default()
        };
        let scenario = Scenario::load("withdraw-race", params).unwrap();

        match &scenario.steps[0] {
            ScenarioStep::WithdrawRace { funding, attempts, .. } => {
                assert_eq!(*attempts, 7);
                assert_eq!(funding, "30");
            }
            other => panic!("unexpected first step: {other:?}"),
        }
    }

    #[test]
    fn test_parse_json_scenario() {
        let raw = r#"{
            "name": "custom",
            "description": "hand written",
            "steps": [
                {"step": "deposit", "account": "bob", "amount": "5", "currency": "gbp"},
                {"step": "withdraw", "account": "bob", "amount": "6", "currency": "GBP", "expect": "rejected"},
                {"step": "expect_balance", "account": "bob", "currency": "GBP", "amount": "5"}
            ]
        }"#;

        let scenario: Scenario = serde_json::from_str(raw).unwrap();
        assert_eq!(scenario.steps.len(), 3);
        assert!(matches!(
            scenario.steps[0],
            ScenarioStep::Deposit { expect: Expectation::Committed, .. }
        ));
        assert!(matches!(
            scenario.steps[1],
            ScenarioStep::Withdraw { expect: Expectation::Rejected, .. }
        ));
    }
}
