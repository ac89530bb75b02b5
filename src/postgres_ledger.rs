use std::sync::Mutex;

use postgres::{Client, NoTls};

use crate::models::{canonical_key, Account, BalanceTransaction, ErrorCode, OperationKind};
use crate::storage::{
    balance_from_sql, balance_to_sql, validate_table, LedgerBackend, QueryError, StorageError,
};

pub struct PostgresLedger {
    client: Mutex<Client>,
    table: String,
}

impl PostgresLedger {
    pub fn connect(connection_string: &str, table: &str) -> Result<Self, StorageError> {
        validate_table(table)?;
        let client = Client::connect(connection_string, NoTls)?;

        let ledger = Self {
            client: Mutex::new(client),
            table: table.to_string(),
        };
        ledger.init_schema()?;
        tracing::info!(table = %ledger.table, "postgres ledger ready");
        Ok(ledger)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let mut client = self.client.lock().unwrap();
        client.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                username TEXT PRIMARY KEY,
                balance BIGINT NOT NULL CHECK (balance >= 0)
            );",
            self.table
        ))?;
        Ok(())
    }

    fn current_balance(
        client: &mut Client,
        table: &str,
        username: &str,
    ) -> Result<Option<i64>, StorageError> {
        let sql = format!("SELECT balance FROM {} WHERE username = $1", table);
        let row = client.query_opt(sql.as_str(), &[&username])?;
        Ok(row.map(|r| r.get(0)))
    }
}

impl LedgerBackend for PostgresLedger {
    fn create_account(&self, username: &str, initial_balance: u64) -> Result<(), QueryError> {
        let mut client = self.client.lock().unwrap();
        let username = canonical_key(username);
        let balance = balance_to_sql(initial_balance)?;

        let sql = format!(
            "INSERT INTO {} (username, balance) VALUES ($1, $2)
             ON CONFLICT (username) DO NOTHING",
            self.table
        );
        let changed = client.execute(sql.as_str(), &[&username, &balance])?;
        // Zero affected rows means the row was already there.
        if changed == 0 {
            return Err(ErrorCode::AccountNotFound.into());
        }
        tracing::debug!(username = %username, balance = initial_balance, "account created");
        Ok(())
    }

    fn delete_account(&self, username: &str) -> Result<(), QueryError> {
        let mut client = self.client.lock().unwrap();
        let username = canonical_key(username);

        let sql = format!("DELETE FROM {} WHERE username = $1", self.table);
        let changed = client.execute(sql.as_str(), &[&username])?;
        if changed == 0 {
            return Err(ErrorCode::AccountNotFound.into());
        }
        tracing::debug!(username = %username, "account deleted");
        Ok(())
    }

    fn update_balance(&self, transaction: &BalanceTransaction) -> Result<(), QueryError> {
        let mut client = self.client.lock().unwrap();
        let username = transaction.target();

        let current = match Self::current_balance(&mut client, &self.table, username)? {
            Some(raw) => balance_from_sql(raw)?,
            None => return Err(ErrorCode::AccountNotFound.into()),
        };
        transaction.verify(current)?;

        let value = balance_to_sql(transaction.effective_value())?;
        let changed = match (transaction.kind(), transaction.balance_cap()) {
            (OperationKind::Increment, Some(cap)) => {
                let cap = balance_to_sql(cap)?;
                let sql = format!(
                    "UPDATE {} SET balance = LEAST(balance + $1, $2) WHERE username = $3",
                    self.table
                );
                client.execute(sql.as_str(), &[&value, &cap, &username])?
            }
            (OperationKind::Increment, None) => {
                let sql = format!(
                    "UPDATE {} SET balance = balance + $1 WHERE username = $2",
                    self.table
                );
                client.execute(sql.as_str(), &[&value, &username])?
            }
            (OperationKind::Decrement, _) => {
                let sql = format!(
                    "UPDATE {} SET balance = GREATEST(balance - $1, 0) WHERE username = $2",
                    self.table
                );
                client.execute(sql.as_str(), &[&value, &username])?
            }
            (OperationKind::Set, _) => {
                let sql = format!(
                    "UPDATE {} SET balance = $1 WHERE username = $2",
                    self.table
                );
                client.execute(sql.as_str(), &[&value, &username])?
            }
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
        let mut client = self.client.lock().unwrap();
        let username = canonical_key(username);
        match Self::current_balance(&mut client, &self.table, &username)? {
            Some(raw) => Ok(balance_from_sql(raw)?),
            None => Err(ErrorCode::AccountNotFound.into()),
        }
    }

    fn top_accounts(&self, limit: u32, offset: u32) -> Result<Vec<Account>, QueryError> {
        let mut client = self.client.lock().unwrap();
        let sql = format!(
            "SELECT username, balance FROM {}
             ORDER BY balance DESC, username ASC LIMIT $1 OFFSET $2",
            self.table
        );
        let limit = i64::from(limit);
        let offset = i64::from(offset);
        let rows = client.query(sql.as_str(), &[&limit, &offset])?;

        let mut accounts = Vec::new();
        for row in rows {
            let username: String = row.get(0);
            let raw: i64 = row.get(1);
            accounts.push(Account {
                username,
                balance: balance_from_sql(raw)?,
            });
        }
        Ok(accounts)
    }
}
