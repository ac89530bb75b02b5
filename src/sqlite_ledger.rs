use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::models::{canonical_key, Account, BalanceTransaction, ErrorCode, OperationKind};
use crate::storage::{
    balance_from_sql, balance_to_sql, validate_table, LedgerBackend, QueryError, StorageError,
};

pub struct SqliteLedger {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteLedger {
    pub fn open(path: &str, table: &str) -> Result<Self, StorageError> {
        validate_table(table)?;
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let ledger = Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        };
        ledger.init_schema()?;
        tracing::info!(path, table = %ledger.table, "sqlite ledger ready");
        Ok(ledger)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                username TEXT PRIMARY KEY,
                balance INTEGER NOT NULL CHECK (balance >= 0)
            );",
            self.table
        ))?;
        Ok(())
    }

    fn current_balance(
        conn: &Connection,
        table: &str,
        username: &str,
    ) -> Result<Option<i64>, StorageError> {
        let result = conn.query_row(
            &format!("SELECT balance FROM {} WHERE username = ?1", table),
            params![username],
            |row| row.get(0),
        );
        match result {
            Ok(balance) => Ok(Some(balance)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl LedgerBackend for SqliteLedger {
    fn create_account(&self, username: &str, initial_balance: u64) -> Result<(), QueryError> {
        let conn = self.conn.lock().unwrap();
        let username = canonical_key(username);
        let balance = balance_to_sql(initial_balance)?;

        let changed = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (username, balance) VALUES (?1, ?2)",
                self.table
            ),
            params![username, balance],
        )?;
        // Zero affected rows means the row was already there.
        if changed == 0 {
            return Err(ErrorCode::AccountNotFound.into());
        }
        tracing::debug!(username = %username, balance = initial_balance, "account created");
        Ok(())
    }

    fn delete_account(&self, username: &str) -> Result<(), QueryError> {
        let conn = self.conn.lock().unwrap();
        let username = canonical_key(username);

        let changed = conn.execute(
            &format!("DELETE FROM {} WHERE username = ?1", self.table),
            params![username],
        )?;
        if changed == 0 {
            return Err(ErrorCode::AccountNotFound.into());
        }
        tracing::debug!(username = %username, "account deleted");
        Ok(())
    }

    fn update_balance(&self, transaction: &BalanceTransaction) -> Result<(), QueryError> {
        let conn = self.conn.lock().unwrap();
        let username = transaction.target();

        let current = match Self::current_balance(&conn, &self.table, username)? {
            Some(raw) => balance_from_sql(raw)?,
            None => return Err(ErrorCode::AccountNotFound.into()),
        };
        transaction.verify(current)?;

        let value = balance_to_sql(transaction.effective_value())?;
        let changed = match (transaction.kind(), transaction.balance_cap()) {
            (OperationKind::Increment, Some(cap)) => {
                let cap = balance_to_sql(cap)?;
                conn.execute(
                    &format!(
                        "UPDATE {} SET balance = MIN(balance + ?1, ?2) WHERE username = ?3",
                        self.table
                    ),
                    params![value, cap, username],
                )?
            }
            (OperationKind::Increment, None) => conn.execute(
                &format!(
                    "UPDATE {} SET balance = balance + ?1 WHERE username = ?2",
                    self.table
                ),
                params![value, username],
            )?,
            (OperationKind::Decrement, _) => conn.execute(
                &format!(
                    "UPDATE {} SET balance = MAX(balance - ?1, 0) WHERE username = ?2",
                    self.table
                ),
                params![value, username],
            )?,
            (OperationKind::Set, _) => conn.execute(
                &format!(
                    "UPDATE {} SET balance = ?1 WHERE username = ?2",
                    self.table
                ),
                params![value, username],
            )?,
        };

        if changed == 0 {
            return Err(ErrorCode::NoChangesMade.into());
        }
        tracing::debug!(
            username,
            kind = ?transaction.kind(),
            value = transaction.value(),
            "balance updated"
        );
        Ok(())
    }

    fn balance(&self, username: &str) -> Result<u64, QueryError> {
        let conn = self.conn.lock().unwrap();
        let username = canonical_key(username);
        match Self::current_balance(&conn, &self.table, &username)? {
            Some(raw) => Ok(balance_from_sql(raw)?),
            None => Err(ErrorCode::AccountNotFound.into()),
        }
    }

    fn top_accounts(&self, limit: u32, offset: u32) -> Result<Vec<Account>, QueryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT username, balance FROM {}
             ORDER BY balance DESC, username ASC LIMIT ?1 OFFSET ?2",
            self.table
        ))?;
        let rows = stmt.query_map(params![i64::from(limit), i64::from(offset)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut accounts = Vec::new();
        for row in rows {
            let (username, raw) = row?;
            accounts.push(Account {
                username,
                balance: balance_from_sql(raw)?,
            });
        }
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> SqliteLedger {
        SqliteLedger::open(":memory:", "players").unwrap()
    }

    fn code(result: Result<(), QueryError>) -> ErrorCode {
        match result {
            Err(e) => e.code().expect("expected a domain code"),
            Ok(()) => panic!("expected a rejection"),
        }
    }

    #[test]
    fn test_sqlite_create_fetch_delete() {
        let ledger = open();
        ledger.create_account("Steve", 100).unwrap();

        assert_eq!(ledger.balance("steve").unwrap(), 100);
        assert_eq!(ledger.balance("STEVE").unwrap(), 100);

        ledger.delete_account("steve").unwrap();
        match ledger.balance("steve") {
            Err(e) => assert_eq!(e.code(), Some(ErrorCode::AccountNotFound)),
            Ok(b) => panic!("account should be gone, got balance {}", b),
        }
        assert_eq!(code(ledger.delete_account("steve")), ErrorCode::AccountNotFound);
    }

    #[test]
    fn test_sqlite_create_existing_account() {
        let ledger = open();
        ledger.create_account("steve", 100).unwrap();

        assert_eq!(code(ledger.create_account("steve", 500)), ErrorCode::AccountNotFound);
        assert_eq!(ledger.balance("steve").unwrap(), 100);
    }

    #[test]
    fn test_sqlite_update_paths() {
        let ledger = open();
        ledger.create_account("steve", 100).unwrap();

        let add = BalanceTransaction::new("steve", OperationKind::Increment, 25, None).unwrap();
        ledger.update_balance(&add).unwrap();
        assert_eq!(ledger.balance("steve").unwrap(), 125);

        let sub = BalanceTransaction::new("steve", OperationKind::Decrement, 25, None).unwrap();
        ledger.update_balance(&sub).unwrap();
        assert_eq!(ledger.balance("steve").unwrap(), 100);

        let set = BalanceTransaction::new("steve", OperationKind::Set, 900, Some(150)).unwrap();
        ledger.update_balance(&set).unwrap();
        assert_eq!(ledger.balance("steve").unwrap(), 150, "set is clamped to the cap");
    }

    #[test]
    fn test_sqlite_update_missing_account() {
        let ledger = open();
        for kind in [OperationKind::Increment, OperationKind::Decrement, OperationKind::Set] {
            let tx = BalanceTransaction::new("ghost", kind, 10, None).unwrap();
            assert_eq!(code(ledger.update_balance(&tx)), ErrorCode::AccountNotFound);
        }
    }

    #[test]
    fn test_sqlite_schema_rejects_negative_balance() {
        let ledger = open();
        let conn = ledger.conn.lock().unwrap();
        let result = conn.execute("INSERT INTO players (username, balance) VALUES ('x', -5)", []);
        assert!(result.is_err(), "CHECK constraint should reject negative rows");
    }

    #[test]
    fn test_sqlite_table_name_validation() {
        match SqliteLedger::open(":memory:", "players; DROP TABLE players") {
            Err(StorageError::InvalidTableName(_)) => {}
            other => panic!("expected InvalidTableName, got {:?}", other.map(|_| ())),
        }
        let ledger = SqliteLedger::open(":memory:", "economy_players").unwrap();
        ledger.create_account("alex", 0).unwrap();
        assert_eq!(ledger.balance("alex").unwrap(), 0);
    }
}
