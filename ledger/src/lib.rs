//! Multiledger Engine
//!
//! Multi-currency account balances with an audit log, updated atomically.

pub mod balance;
pub mod config;
pub mod engine;
pub mod error;
pub mod journal;
pub mod metrics;
pub mod store;

pub use balance::{AccountBalances, Balance, CurrencyBalance};
pub use config::{DatabaseConfig, LedgerConfig, LogFormat, StoreBackend};
pub use engine::{LedgerEngine, Movement, Operation};
pub use error::{LedgerError, LedgerResult, StoreError, StoreResult, UnitOfWorkStage};
pub use journal::{IntegrityReport, TransactionRecord, TransactionStatus, TransactionType};
pub use metrics::{LedgerMetrics, LedgerMetricsSnapshot, SharedMetrics};
pub use store::{open_store, FailurePoint, LedgerStore, MemoryLedgerStore, PgLedgerStore, UnitOfWork};
