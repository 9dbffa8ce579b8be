use std::{env, fmt::Display, str::FromStr, time::Duration, time::SystemTime};

use color_eyre::eyre::{Result, eyre};

use crate::ledger::{
    client::{Consistency, RetryPolicy},
    connect::ConnectRetry,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub connect_retry: ConnectRetry,
    pub store_retry: RetryPolicy,
    pub consistency: Consistency,
    pub queue_capacity: usize,
}

impl Config {
    /// Reads the process environment, after loading `.env` when one exists.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Config::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_attempts = match get("CONNECT_MAX_ATTEMPTS") {
            Some(v) => Some(parse("CONNECT_MAX_ATTEMPTS", &v)?),
            None => None,
        };

        Ok(Config {
            database_url: get("DATABASE_URL").unwrap_or_else(default_database_url),
            connect_retry: ConnectRetry {
                interval: Duration::from_millis(var_or(&get, "CONNECT_RETRY_INTERVAL_MS", 5000)?),
                max_attempts,
            },
            store_retry: RetryPolicy {
                attempts: var_or(&get, "STORE_RETRY_ATTEMPTS", 3u32)?.max(1),
                backoff: Duration::from_millis(var_or(&get, "STORE_RETRY_BACKOFF_MS", 100)?),
            },
            consistency: var_or(&get, "LEDGER_CONSISTENCY", Consistency::default())?,
            queue_capacity: var_or(&get, "QUEUE_CAPACITY", 1024)?,
        })
    }
}

fn var_or<T>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    get(name).map_or(Ok(default), |v| parse(name, &v))
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| eyre!("Invalid {}='{}': {}", name, value, e))
}

/// A fresh sqlite file per run, as nothing survives between runs anyway.
fn default_database_url() -> String {
    let db_suffix = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(
        "sqlite:{}/wallet-ledger-{}.db?mode=rwc",
        env::temp_dir().display(),
        db_suffix
    )
}
