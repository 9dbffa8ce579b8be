use std::{future::Future, str::FromStr, time::Duration};

use derive_more::Display;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::{
    domain::{
        command::Command,
        error::Rejection,
        props::{TransactionId, WalletId},
        transaction::{TransactionRecord, TxStatus},
    },
    ledger::{LedgerStore, StoreError, WalletBalance},
};

/// Re-reads allowed when a versioned commit loses the race for a wallet.
pub const MAX_CONFLICT_RETRIES: u32 = 8;

/// How the read / compute / write sequence is protected against concurrent writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Consistency {
    /// Balance write is conditional on the version that was read, and commits
    /// together with the audit record.
    #[default]
    #[display("versioned")]
    Versioned,
    /// Three independent round trips. Concurrent commands on one wallet may
    /// overwrite each other's balance.
    #[display("unguarded")]
    Unguarded,
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "versioned" => Ok(Consistency::Versioned),
            "unguarded" => Ok(Consistency::Unguarded),
            other => Err(format!("unknown consistency mode '{}'", other)),
        }
    }
}

/// Bounded fixed-backoff retry of a single ledger store call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Last stage a command reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Stage {
    Received,
    Validated,
    BalanceFetched,
    BalanceComputed,
    Committed,
}

/// A command dropped without any transaction record.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub command: Command,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Committed(TransactionRecord),
    Rejected(TransactionRecord, Rejection),
    Dropped(DeadLetter),
}

#[cfg(test)]
impl Outcome {
    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            Outcome::Committed(r) | Outcome::Rejected(r, _) => Some(r),
            Outcome::Dropped(_) => None,
        }
    }
}

/// Drives one command through the ledger store: validate, read, compute,
/// write, audit.
pub struct LedgerClient<S> {
    store: S,
    consistency: Consistency,
    retry: RetryPolicy,
}

impl<S: LedgerStore> LedgerClient<S> {
    pub fn new(store: S, consistency: Consistency, retry: RetryPolicy) -> Self {
        LedgerClient {
            store,
            consistency,
            retry,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn get_balance(&self, wallet_id: WalletId) -> Result<WalletBalance, StoreError> {
        self.with_retry("read balance", || self.store.read_balance(wallet_id))
            .await
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<TransactionRecord, StoreError> {
        self.with_retry("read transaction", || self.store.read_transaction(id))
            .await
    }

    pub async fn apply(&self, command: Command) -> Outcome {
        debug!(
            "{} {} for wallet {}: {}",
            command.kind,
            command.amount,
            command.wallet_id,
            Stage::Received
        );

        if let Err(rejection) = command.kind.check_amount(*command.amount) {
            return self.reject(command, rejection, Stage::Received).await;
        }
        debug!("{} for wallet {}: {}", command.kind, command.wallet_id, Stage::Validated);

        match self.consistency {
            Consistency::Versioned => self.apply_versioned(command).await,
            Consistency::Unguarded => self.apply_unguarded(command).await,
        }
    }

    async fn apply_versioned(&self, command: Command) -> Outcome {
        for _ in 0..=MAX_CONFLICT_RETRIES {
            let (read, next) = match self.fetch_and_compute(&command).await {
                Ok(computed) => computed,
                Err(outcome) => return *outcome,
            };

            let record = TransactionRecord::finalize(&command, TxStatus::Success);
            let committed = self
                .with_retry("commit balance", || {
                    self.store.commit_mutation(&read, next, &record)
                })
                .await;

            match committed {
                Ok(()) => return self.committed(record, read.balance, next),
                Err(StoreError::VersionConflict { .. }) => {
                    // an earlier attempt may have landed before its reply was lost
                    match self.get_transaction(record.id).await {
                        Ok(existing) => return self.committed(existing, read.balance, next),
                        Err(StoreError::TransactionNotFound(_)) => debug!(
                            "Wallet {} changed under {} command, re-reading",
                            command.wallet_id, command.kind
                        ),
                        Err(e) => {
                            return self.dropped(
                                command,
                                Stage::BalanceComputed,
                                format!("commit outcome unknown after version conflict: {}", e),
                            );
                        }
                    }
                }
                Err(e) => return self.dropped(command, Stage::BalanceComputed, e.to_string()),
            }
        }

        self.dropped(
            command,
            Stage::BalanceComputed,
            format!("gave up after {} version conflicts", MAX_CONFLICT_RETRIES + 1),
        )
    }

    async fn apply_unguarded(&self, command: Command) -> Outcome {
        let (read, next) = match self.fetch_and_compute(&command).await {
            Ok(computed) => computed,
            Err(outcome) => return *outcome,
        };

        if let Err(e) = self
            .with_retry("write balance", || {
                self.store.write_balance(command.wallet_id, next)
            })
            .await
        {
            return self.dropped(command, Stage::BalanceComputed, e.to_string());
        }

        let record = TransactionRecord::finalize(&command, TxStatus::Success);
        if let Err(e) = self.append(&record).await {
            return self.dropped(
                command,
                Stage::BalanceComputed,
                format!("balance written but not audited: {}", e),
            );
        }

        self.committed(record, read.balance, next)
    }

    /// Reads the balance and computes the next one. Rejections and drops
    /// come back as the final outcome.
    async fn fetch_and_compute(
        &self,
        command: &Command,
    ) -> Result<(WalletBalance, Decimal), Box<Outcome>> {
        let read = match self.get_balance(command.wallet_id).await {
            Ok(read) => read,
            Err(e) => {
                return Err(Box::new(self.dropped(
                    command.clone(),
                    Stage::Validated,
                    e.to_string(),
                )));
            }
        };
        debug!(
            "{} for wallet {}: {} ({})",
            command.kind,
            command.wallet_id,
            Stage::BalanceFetched,
            read.balance
        );

        match command.kind.next_balance(read.balance, *command.amount) {
            Ok(next) => {
                debug!(
                    "{} for wallet {}: {} ({})",
                    command.kind,
                    command.wallet_id,
                    Stage::BalanceComputed,
                    next
                );
                Ok((read, next))
            }
            Err(rejection) => Err(Box::new(
                self.reject(command.clone(), rejection, Stage::BalanceFetched)
                    .await,
            )),
        }
    }

    async fn reject(&self, command: Command, rejection: Rejection, stage: Stage) -> Outcome {
        warn!(
            "Rejected {} of {} for wallet {}: {}",
            command.kind, command.amount, command.wallet_id, rejection
        );

        let record = TransactionRecord::finalize(&command, TxStatus::Error);
        match self.append(&record).await {
            Ok(()) => {
                info!("New error {} transaction {} created", record.kind, record.id);
                Outcome::Rejected(record, rejection)
            }
            Err(e) => self.dropped(command, stage, e.to_string()),
        }
    }

    fn committed(&self, record: TransactionRecord, from: Decimal, to: Decimal) -> Outcome {
        info!(
            "New {} transaction {} created, wallet {} balance {} -> {}",
            record.kind, record.id, record.wallet_id, from, to
        );
        debug!("{} for wallet {}: {}", record.kind, record.wallet_id, Stage::Committed);
        Outcome::Committed(record)
    }

    fn dropped(&self, command: Command, stage: Stage, reason: String) -> Outcome {
        error!(
            "Dropping {} of {} for wallet {} after {}: {}",
            command.kind, command.amount, command.wallet_id, stage, reason
        );
        Outcome::Dropped(DeadLetter {
            command,
            stage,
            reason,
        })
    }

    /// A duplicate of the id we just generated can only be our own earlier attempt.
    async fn append(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        match self
            .with_retry("append transaction", || {
                self.store.append_transaction(record)
            })
            .await
        {
            Err(StoreError::DuplicateTransaction(id)) if id == record.id => Ok(()),
            res => res,
        }
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt < self.retry.attempts => {
                    warn!(
                        "Failed to {} (attempt {}/{}): {}. Retrying...",
                        what, attempt, self.retry.attempts, e
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                res => return res,
            }
        }
    }
}
