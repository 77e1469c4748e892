//! PostgreSQL ledger store.

use async_trait::async_trait;
use multiledger_common::{time, AccountId, Currency, TransactionId};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::balance::Balance;
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::journal::{NewTransaction, TransactionRecord};
use crate::store::{Deduction, LedgerStore, UnitOfWork};

const BALANCE_COLUMNS: &str = "account_id, currency, amount, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, account_id, type, amount, currency, status, reference, \
     description, transaction_date, created_at, updated_at";

/// Ledger store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Open a pool against `config.url`.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create the `balances` and `transactions` tables and their indexes.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Ledger schema is up to date");
        Ok(())
    }
}

fn balance_from_row(row: &PgRow) -> StoreResult<Balance> {
    Ok(Balance {
        account_id: AccountId::from_uuid(row.try_get::<Uuid, _>("account_id")?),
        currency: Currency::new(row.try_get::<String, _>("currency")?),
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> StoreResult<TransactionRecord> {
    let kind: String = row.try_get("type")?;
    let status: String = row.try_get("status")?;

    Ok(TransactionRecord {
        id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
        account_id: AccountId::from_uuid(row.try_get::<Uuid, _>("account_id")?),
        kind: kind.parse().map_err(StoreError::Corrupt)?,
        amount: row.try_get("amount")?,
        currency: Currency::new(row.try_get::<String, _>("currency")?),
        status: status.parse().map_err(StoreError::Corrupt)?,
        reference: row.try_get("reference")?,
        description: row.try_get("description")?,
        transaction_date: row.try_get("transaction_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn balances(&self, account: &AccountId) -> StoreResult<Vec<Balance>> {
        let rows = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM balances WHERE account_id = $1 ORDER BY currency"
        ))
        .bind(account.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(balance_from_row).collect()
    }

    async fn transactions(&self, account: &AccountId) -> StoreResult<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE account_id = $1 ORDER BY transaction_date DESC, id DESC"
        ))
        .bind(account.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }
}

/// Unit of work mapped onto a database transaction. Dropping it without a
/// commit rolls the transaction back when the connection returns to the pool.
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn increase_balance(
        &mut self,
        account: &AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> StoreResult<Balance> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO balances (account_id, currency, amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (account_id, currency)
            DO UPDATE SET amount = balances.amount + EXCLUDED.amount,
                          updated_at = EXCLUDED.updated_at
            RETURNING {BALANCE_COLUMNS}
            "#
        ))
        .bind(account.as_uuid())
        .bind(currency.code())
        .bind(amount)
        .bind(time::now())
        .fetch_one(&mut *self.tx)
        .await?;

        debug!(account = %account, currency = %currency, "Balance increased");
        balance_from_row(&row)
    }

    async fn decrease_balance_if_sufficient(
        &mut self,
        account: &AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> StoreResult<Deduction> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE balances
            SET amount = amount - $3,
                updated_at = $4
            WHERE account_id = $1 AND currency = $2 AND amount >= $3
            RETURNING {BALANCE_COLUMNS}
            "#
        ))
        .bind(account.as_uuid())
        .bind(currency.code())
        .bind(amount)
        .bind(time::now())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => {
                debug!(account = %account, currency = %currency, "Balance decreased");
                Ok(Deduction::Applied(balance_from_row(&row)?))
            }
            None => Ok(Deduction::NotMatched),
        }
    }

    async fn append_transaction(&mut self, entry: NewTransaction) -> StoreResult<TransactionRecord> {
        let record = TransactionRecord::completed(entry);

        sqlx::query(&format!(
            "INSERT INTO transactions ({TRANSACTION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(record.id.as_uuid())
        .bind(record.account_id.as_uuid())
        .bind(record.kind.as_str())
        .bind(record.amount)
        .bind(record.currency.code())
        .bind(record.status.as_str())
        .bind(&record.reference)
        .bind(&record.description)
        .bind(record.transaction_date)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;

        debug!(transaction_id = %record.id, "Transaction appended");
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
