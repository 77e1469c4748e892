//! Per-currency balance records.

use multiledger_common::{time, AccountId, Currency, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Amount of one currency held by one account.
///
/// At most one record exists per (account, currency). The amount never goes
/// below zero: withdrawals only apply through a conditional deduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Owning account.
    pub account_id: AccountId,
    /// Currency of the balance.
    pub currency: Currency,
    /// Current amount.
    pub amount: Decimal,
    /// When the record was first created.
    pub created_at: Timestamp,
    /// When the record was last changed.
    pub updated_at: Timestamp,
}

impl Balance {
    /// Create a new zero balance.
    pub fn zero(account_id: AccountId, currency: Currency) -> Self {
        let now = time::now();
        Self {
            account_id,
            currency,
            amount: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the balance covers `amount`.
    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.amount >= amount
    }

    /// Add `amount`. Fails without touching the record when the sum does not
    /// fit in a `Decimal`.
    pub(crate) fn credit(&mut self, amount: Decimal) -> StoreResult<()> {
        self.amount = self.amount.checked_add(amount).ok_or_else(|| {
            StoreError::Overflow(format!(
                "{} {} + {} on account {}",
                self.amount, self.currency, amount, self.account_id
            ))
        })?;
        self.updated_at = time::now();
        Ok(())
    }

    pub(crate) fn debit(&mut self, amount: Decimal) {
        self.amount -= amount;
        self.updated_at = time::now();
    }
}

/// One line of a balance query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyBalance {
    pub currency: Currency,
    pub amount: Decimal,
}

impl From<&Balance> for CurrencyBalance {
    fn from(balance: &Balance) -> Self {
        Self {
            currency: balance.currency.clone(),
            amount: balance.amount,
        }
    }
}

/// All balances held by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalances {
    pub account_id: AccountId,
    pub balances: Vec<CurrencyBalance>,
}

impl AccountBalances {
    pub fn new(account_id: AccountId, balances: &[Balance]) -> Self {
        Self {
            account_id,
            balances: balances.iter().map(CurrencyBalance::from).collect(),
        }
    }

    /// Amount held in `currency`, zero when there is no record.
    pub fn amount_of(&self, currency: &Currency) -> Decimal {
        self.balances
            .iter()
            .find(|b| &b.currency == currency)
            .map(|b| b.amount)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_operations() {
        let mut balance = Balance::zero(AccountId::new(), Currency::usd());
        let created = balance.created_at;

        balance.credit(dec!(100)).unwrap();
        balance.debit(dec!(30));

        assert_eq!(balance.amount, dec!(70));
        assert!(balance.has_sufficient_funds(dec!(70)));
        assert!(!balance.has_sufficient_funds(dec!(70.01)));
        assert_eq!(balance.created_at, created);
        assert!(balance.updated_at >= created);
    }

    #[test]
    fn test_credit_overflow_leaves_balance_unchanged() {
        let mut balance = Balance::zero(AccountId::new(), Currency::usd());
        balance.credit(Decimal::MAX).unwrap();
        let updated = balance.updated_at;

        let err = balance.credit(dec!(1)).unwrap_err();

        assert!(matches!(err, StoreError::Overflow(_)));
        assert_eq!(balance.amount, Decimal::MAX);
        assert_eq!(balance.updated_at, updated);
    }

    #[test]
    fn test_account_balances_projection() {
        let account = AccountId::new();
        let mut usd = Balance::zero(account, Currency::usd());
        usd.credit(dec!(100)).unwrap();
        let mut eur = Balance::zero(account, Currency::eur());
        eur.credit(dec!(50)).unwrap();

        let view = AccountBalances::new(account, &[usd, eur]);
        assert_eq!(view.balances.len(), 2);
        assert_eq!(view.amount_of(&Currency::usd()), dec!(100));
        assert_eq!(view.amount_of(&Currency::eur()), dec!(50));
        assert_eq!(view.amount_of(&Currency::gbp()), Decimal::ZERO);
    }
}
