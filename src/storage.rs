use std::sync::Arc;

use thiserror::Error;

use crate::config::{BackendKind, StorageConfig};
use crate::models::{Account, BalanceTransaction, EmptyTarget, ErrorCode};
use crate::postgres_ledger::PostgresLedger;
use crate::sqlite_ledger::SqliteLedger;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("balance {0} exceeds the storable range")]
    BalanceOutOfRange(u64),
    #[error("stored balance {0} is negative")]
    NegativeBalance(i64),
    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),
    #[error("{0}")]
    Other(String),
}

/// What a balance query hands back when it fails. Domain rejections carry
/// one of the closed [`ErrorCode`] values and are ordinary outcomes the
/// caller is expected to branch on; storage failures mean the engine or
/// connection itself broke.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Domain(#[from] ErrorCode),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl QueryError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            QueryError::Domain(code) => Some(*code),
            QueryError::Storage(_) => None,
        }
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(e: rusqlite::Error) -> Self {
        QueryError::Storage(StorageError::Sqlite(e))
    }
}

impl From<postgres::Error> for QueryError {
    fn from(e: postgres::Error) -> Self {
        QueryError::Storage(StorageError::Postgres(e))
    }
}

impl From<EmptyTarget> for QueryError {
    fn from(e: EmptyTarget) -> Self {
        QueryError::Storage(StorageError::Other(e.to_string()))
    }
}

pub trait LedgerBackend: Send + Sync {
    // Row lifecycle
    fn create_account(&self, username: &str, initial_balance: u64) -> Result<(), QueryError>;
    fn delete_account(&self, username: &str) -> Result<(), QueryError>;

    // Balance operations
    fn update_balance(&self, transaction: &BalanceTransaction) -> Result<(), QueryError>;
    fn balance(&self, username: &str) -> Result<u64, QueryError>;
    fn top_accounts(&self, limit: u32, offset: u32) -> Result<Vec<Account>, QueryError>;
}

/// Opens the backend named by the config.
pub fn open_backend(config: &StorageConfig) -> Result<Arc<dyn LedgerBackend>, StorageError> {
    match config.backend {
        BackendKind::Sqlite => Ok(Arc::new(SqliteLedger::open(&config.path, &config.table)?)),
        BackendKind::Postgres => Ok(Arc::new(PostgresLedger::connect(
            &config.connection,
            &config.table,
        )?)),
    }
}

/// Balances are unsigned in the API but live in signed 64-bit columns.
pub(crate) fn balance_to_sql(value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::BalanceOutOfRange(value))
}

pub(crate) fn balance_from_sql(raw: i64) -> Result<u64, StorageError> {
    u64::try_from(raw).map_err(|_| StorageError::NegativeBalance(raw))
}

/// Table names are spliced into SQL text, so only plain identifiers pass.
pub(crate) fn validate_table(name: &str) -> Result<(), StorageError> {
    if is_safe_identifier(name) {
        Ok(())
    } else {
        Err(StorageError::InvalidTableName(name.to_string()))
    }
}

fn is_safe_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_pass_validation() {
        assert!(validate_table("players").is_ok());
        assert!(validate_table("player_balances2").is_ok());
        assert!(validate_table("_shadow").is_ok());
    }

    #[test]
    fn hostile_table_names_are_rejected() {
        for name in ["", "players; DROP TABLE players", "play ers", "2players", "players-old", "players\""] {
            match validate_table(name) {
                Err(StorageError::InvalidTableName(n)) => assert_eq!(n, name),
                other => panic!("expected InvalidTableName for {:?}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn balance_round_trips_through_sql_range() {
        assert_eq!(balance_to_sql(0).unwrap(), 0);
        assert_eq!(balance_to_sql(i64::MAX as u64).unwrap(), i64::MAX);
        assert_eq!(balance_from_sql(42).unwrap(), 42);
    }

    #[test]
    fn balance_past_sql_range_is_rejected() {
        let too_big = i64::MAX as u64 + 1;
        match balance_to_sql(too_big) {
            Err(StorageError::BalanceOutOfRange(v)) => assert_eq!(v, too_big),
            other => panic!("expected BalanceOutOfRange, got {:?}", other),
        }
        match balance_from_sql(-1) {
            Err(StorageError::NegativeBalance(v)) => assert_eq!(v, -1),
            other => panic!("expected NegativeBalance, got {:?}", other),
        }
    }

    #[test]
    fn only_domain_errors_expose_a_code() {
        let domain = QueryError::from(ErrorCode::AccountNotFound);
        assert_eq!(domain.code(), Some(ErrorCode::AccountNotFound));

        let storage = QueryError::from(StorageError::Other("down".to_string()));
        assert_eq!(storage.code(), None);
    }
}
