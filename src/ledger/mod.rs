use async_trait::async_trait;
use derive_more::Display;
use rust_decimal::Decimal;

use crate::domain::{
    props::{TransactionId, WalletId},
    transaction::TransactionRecord,
};

pub mod client;
pub mod connect;
pub mod schema;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display("wallet {_0} not found")]
    WalletNotFound(WalletId),
    #[display("transaction {_0} not found")]
    TransactionNotFound(TransactionId),
    #[display("transaction {_0} already exists")]
    DuplicateTransaction(TransactionId),
    #[display("wallet {wallet_id} was modified after version {expected}")]
    VersionConflict { wallet_id: WalletId, expected: i64 },
    #[display("balance {balance} of wallet {wallet_id} is out of bounds")]
    InvalidBalance { wallet_id: WalletId, balance: Decimal },
    #[display("corrupt ledger row: {_0}")]
    Corrupt(String),
    #[display("database failure: {_0}")]
    Database(sqlx::Error),
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

impl StoreError {
    /// Only infrastructure faults are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

/// Balance as read, together with the row version it was read at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletBalance {
    pub wallet_id: WalletId,
    pub balance: Decimal,
    pub version: i64,
}

/// Storage contract of the ledger. Every operation is its own unit of work:
/// it either commits completely or leaves nothing behind.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn read_balance(&self, wallet_id: WalletId) -> Result<WalletBalance, StoreError>;

    /// Unconditional overwrite. Bounds are the caller's responsibility.
    async fn write_balance(&self, wallet_id: WalletId, new_balance: Decimal)
    -> Result<(), StoreError>;

    /// Rejects a reused id and a wallet id with no wallet row.
    async fn append_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError>;

    async fn read_transaction(&self, id: TransactionId) -> Result<TransactionRecord, StoreError>;

    /// Overwrites the balance only if the wallet is still at `read.version`,
    /// and appends `record` in the same storage transaction.
    async fn commit_mutation(
        &self,
        read: &WalletBalance,
        new_balance: Decimal,
        record: &TransactionRecord,
    ) -> Result<(), StoreError>;
}
