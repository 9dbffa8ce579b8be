use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Barrier;

use crate::{
    domain::{
        props::{TransactionId, WalletId},
        transaction::TransactionRecord,
    },
    ledger::{
        LedgerStore, StoreError, WalletBalance,
        schema::{init_tables, provision_wallet},
        sqlite::SqliteLedgerStore,
    },
};

pub async fn memory_store(wallets: &[(i64, Decimal)]) -> SqliteLedgerStore {
    // one connection, otherwise every connection sees its own empty memory db
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_tables(&pool).await.unwrap();
    for (id, balance) in wallets {
        provision_wallet(&pool, WalletId(*id), *balance).await.unwrap();
    }

    SqliteLedgerStore::new(pool)
}

pub async fn count_records(store: &SqliteLedgerStore) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    ReadBalance,
    WriteBalance,
    AppendTransaction,
    ReadTransaction,
    CommitMutation,
}

/// Wraps a store and fails the first `times` calls of `op`, with a transient
/// database error unless told otherwise.
pub struct FlakyStore<S> {
    pub inner: S,
    op: Op,
    remaining: AtomicUsize,
    error: fn() -> StoreError,
    calls: Mutex<Vec<Op>>,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S, op: Op, times: usize) -> Self {
        FlakyStore::failing_with(inner, op, times, || {
            StoreError::Database(sqlx::Error::PoolTimedOut)
        })
    }

    pub fn failing_with(inner: S, op: Op, times: usize, error: fn() -> StoreError) -> Self {
        FlakyStore {
            inner,
            op,
            remaining: AtomicUsize::new(times),
            error,
            calls: Mutex::new(vec![]),
        }
    }

    pub fn calls(&self) -> Vec<Op> {
        self.calls.lock().unwrap().clone()
    }

    fn enter(&self, op: Op) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(op);
        if op == self.op
            && self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err((self.error)());
        }
        Ok(())
    }
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for FlakyStore<S> {
    async fn read_balance(&self, wallet_id: WalletId) -> Result<WalletBalance, StoreError> {
        self.enter(Op::ReadBalance)?;
        self.inner.read_balance(wallet_id).await
    }

    async fn write_balance(
        &self,
        wallet_id: WalletId,
        new_balance: Decimal,
    ) -> Result<(), StoreError> {
        self.enter(Op::WriteBalance)?;
        self.inner.write_balance(wallet_id, new_balance).await
    }

    async fn append_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        self.enter(Op::AppendTransaction)?;
        self.inner.append_transaction(record).await
    }

    async fn read_transaction(&self, id: TransactionId) -> Result<TransactionRecord, StoreError> {
        self.enter(Op::ReadTransaction)?;
        self.inner.read_transaction(id).await
    }

    async fn commit_mutation(
        &self,
        read: &WalletBalance,
        new_balance: Decimal,
        record: &TransactionRecord,
    ) -> Result<(), StoreError> {
        self.enter(Op::CommitMutation)?;
        self.inner.commit_mutation(read, new_balance, record).await
    }
}

/// Holds every `read_balance` until `parties` callers have read, forcing
/// concurrent commands to interleave between read and write.
pub struct InterleavedReads<S> {
    pub inner: S,
    barrier: Barrier,
    remaining: AtomicUsize,
}

impl<S> InterleavedReads<S> {
    pub fn new(inner: S, parties: usize) -> Self {
        InterleavedReads {
            inner,
            barrier: Barrier::new(parties),
            remaining: AtomicUsize::new(parties),
        }
    }
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for InterleavedReads<S> {
    async fn read_balance(&self, wallet_id: WalletId) -> Result<WalletBalance, StoreError> {
        let read = self.inner.read_balance(wallet_id).await?;
        // only the first round of reads is synchronised, retries pass straight through
        if self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.barrier.wait().await;
        }
        Ok(read)
    }

    async fn write_balance(
        &self,
        wallet_id: WalletId,
        new_balance: Decimal,
    ) -> Result<(), StoreError> {
        self.inner.write_balance(wallet_id, new_balance).await
    }

    async fn append_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        self.inner.append_transaction(record).await
    }

    async fn read_transaction(&self, id: TransactionId) -> Result<TransactionRecord, StoreError> {
        self.inner.read_transaction(id).await
    }

    async fn commit_mutation(
        &self,
        read: &WalletBalance,
        new_balance: Decimal,
        record: &TransactionRecord,
    ) -> Result<(), StoreError> {
        self.inner.commit_mutation(read, new_balance, record).await
    }
}
