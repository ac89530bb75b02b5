//! CoinDB keeps one monetary balance per player for multiplayer game
//! servers, persisted through interchangeable SQLite and PostgreSQL
//! backends behind a single verification-first update path.

pub mod auth;
pub mod config;
pub mod economy;
pub mod http;
pub mod models;
pub mod postgres_ledger;
pub mod sqlite_ledger;
pub mod storage;

pub use economy::Economy;
pub use models::{Account, BalanceTransaction, ErrorCode, OperationKind};
pub use storage::{LedgerBackend, QueryError, StorageError};
