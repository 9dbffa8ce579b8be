use std::str::FromStr;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::domain::{
    command::{Command, CommandKind},
    props::{Amount, TransactionId, WalletId},
};

/// Emitted lowercase; parsed case-insensitively so `Success`/`ERROR` rows still read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    #[display("success")]
    Success,
    #[display("error")]
    Error,
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(TxStatus::Success),
            "error" => Ok(TxStatus::Error),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// Immutable audit entry for one processed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub amount: Amount,
    pub kind: CommandKind,
    pub status: TxStatus,
    pub recorded_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Finalizes the outcome of `command` now, under a freshly generated id.
    pub fn finalize(command: &Command, status: TxStatus) -> Self {
        TransactionRecord {
            id: TransactionId::generate(),
            wallet_id: command.wallet_id,
            amount: command.amount,
            kind: command.kind,
            status,
            recorded_at: Utc::now(),
        }
    }
}
