use std::sync::Arc;

use crate::config::CurrencyConfig;
use crate::models::{canonical_key, Account, BalanceTransaction, OperationKind};
use crate::storage::{LedgerBackend, QueryError, StorageError};

/// Front door for balance operations. Attaches the configured currency
/// rules (starting balance, cap) to the raw transactions it hands the
/// backend.
pub struct Economy {
    ledger: Arc<dyn LedgerBackend>,
    currency: CurrencyConfig,
}

impl Economy {
    pub fn new(ledger: Arc<dyn LedgerBackend>, currency: CurrencyConfig) -> Self {
        Self { ledger, currency }
    }

    pub fn currency(&self) -> &CurrencyConfig {
        &self.currency
    }

    pub fn create(&self, username: &str) -> Result<(), QueryError> {
        self.ledger
            .create_account(username, self.currency.starting_balance)
    }

    pub fn delete(&self, username: &str) -> Result<(), QueryError> {
        self.ledger.delete_account(username)
    }

    pub fn balance(&self, username: &str) -> Result<u64, QueryError> {
        self.ledger.balance(username)
    }

    pub fn top(&self, limit: u32, offset: u32) -> Result<Vec<Account>, QueryError> {
        self.ledger.top_accounts(limit, offset)
    }

    pub fn add(&self, username: &str, amount: u64) -> Result<(), QueryError> {
        let transaction =
            BalanceTransaction::new(username, OperationKind::Increment, amount, self.currency.cap)?;
        self.ledger.update_balance(&transaction)
    }

    pub fn subtract(&self, username: &str, amount: u64) -> Result<(), QueryError> {
        let transaction = BalanceTransaction::new(username, OperationKind::Decrement, amount, None)?;
        self.ledger.update_balance(&transaction)
    }

    pub fn set(&self, username: &str, amount: u64) -> Result<(), QueryError> {
        let transaction =
            BalanceTransaction::new(username, OperationKind::Set, amount, self.currency.cap)?;
        self.ledger.update_balance(&transaction)
    }

    /// Moves funds between two accounts as a debit followed by a credit.
    /// The two legs are separate queries; if the credit leg fails the
    /// payer has already been debited and the caller sees the credit
    /// leg's error.
    pub fn transfer(&self, from: &str, to: &str, amount: u64) -> Result<(), QueryError> {
        if canonical_key(from) == canonical_key(to) {
            return Err(QueryError::Storage(StorageError::Other(
                "transfer requires two distinct accounts".to_string(),
            )));
        }
        self.subtract(from, amount)?;
        self.add(to, amount)
    }

    /// Renders an amount with the configured symbol and thousands separator.
    pub fn format(&self, amount: u64) -> String {
        let digits = amount.to_string();
        let mut grouped = String::new();
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push_str(&self.currency.separator);
            }
            grouped.push(c);
        }
        format!("{}{}", self.currency.symbol, grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_ledger::SqliteLedger;

    fn economy(currency: CurrencyConfig) -> Economy {
        let ledger = Arc::new(SqliteLedger::open(":memory:", "players").unwrap());
        Economy::new(ledger, currency)
    }

    #[test]
    fn amounts_format_with_separators() {
        let economy = economy(CurrencyConfig::default());
        assert_eq!(economy.format(0), "$0");
        assert_eq!(economy.format(999), "$999");
        assert_eq!(economy.format(1000), "$1,000");
        assert_eq!(economy.format(1_234_567), "$1,234,567");
    }

    #[test]
    fn format_honors_configured_symbol_and_separator() {
        let economy = economy(CurrencyConfig {
            symbol: "E".to_string(),
            separator: ".".to_string(),
            ..CurrencyConfig::default()
        });
        assert_eq!(economy.format(50_000), "E50.000");
    }

    #[test]
    fn transfer_to_self_is_rejected_before_storage() {
        let economy = economy(CurrencyConfig::default());
        economy.create("steve").unwrap();

        let result = economy.transfer("steve", "STEVE", 10);
        match result {
            Err(QueryError::Storage(StorageError::Other(_))) => {}
            other => panic!("expected a storage-class rejection, got {:?}", other),
        }
        assert_eq!(economy.balance("steve").unwrap(), 1000);
    }
}
