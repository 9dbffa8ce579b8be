use std::{str::FromStr, time::Duration};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous},
};
use tracing::{info, warn};

use crate::ledger::StoreError;

/// Fixed-interval retry used while the service is starting up.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRetry {
    pub interval: Duration,
    /// `None` retries until the store answers.
    pub max_attempts: Option<u32>,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        ConnectRetry {
            interval: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

/// Opens the shared pool, retrying on the configured interval. The pool is not
/// re-established if it drops later on.
pub async fn connect_with_retry(
    database_url: &str,
    retry: &ConnectRetry,
) -> Result<SqlitePool, StoreError> {
    let opts = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match SqlitePool::connect_with(opts.clone()).await {
            Ok(pool) => {
                info!("Connected to ledger store after {} attempt(s)", attempt);
                return Ok(pool);
            }
            Err(e) => {
                if retry.max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(StoreError::Database(e));
                }
                warn!("Failed to connect to ledger store: {}. Retrying...", e);
                tokio::time::sleep(retry.interval).await;
            }
        }
    }
}
