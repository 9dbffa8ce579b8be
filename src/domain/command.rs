use std::str::FromStr;

use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    error::Rejection,
    props::{Amount, BALANCE_CEILING, WalletId, within_bounds},
};

pub const DEPOSIT_STREAM: &str = "deposit_requests";
pub const WITHDRAW_STREAM: &str = "withdraw_requests";

/// Deposit and withdraw share one pipeline; the kind supplies the amount
/// bounds and the sign of the balance delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    #[display("deposit")]
    Deposit,
    #[display("withdraw")]
    Withdraw,
}

impl CommandKind {
    pub fn stream(&self) -> &'static str {
        match self {
            CommandKind::Deposit => DEPOSIT_STREAM,
            CommandKind::Withdraw => WITHDRAW_STREAM,
        }
    }

    /// Bounds on the requested amount, checked before any balance is read.
    pub fn check_amount(&self, amount: Decimal) -> Result<(), Rejection> {
        match self {
            CommandKind::Deposit if amount < Decimal::ZERO => Err(Rejection::NegativeAmount),
            CommandKind::Deposit if amount > BALANCE_CEILING => Err(Rejection::AmountAboveCeiling),
            CommandKind::Withdraw if amount <= Decimal::ZERO => Err(Rejection::NonPositiveAmount),
            _ => Ok(()),
        }
    }

    /// Balance after applying `amount`, or the rejection if it would leave
    /// `[0, BALANCE_CEILING]`.
    pub fn next_balance(&self, current: Decimal, amount: Decimal) -> Result<Decimal, Rejection> {
        let next = match self {
            CommandKind::Deposit => current
                .checked_add(amount)
                .ok_or(Rejection::CeilingExceeded)?,
            CommandKind::Withdraw => {
                if current < amount {
                    return Err(Rejection::InsufficientFunds);
                }
                current - amount
            }
        };

        if next > BALANCE_CEILING {
            return Err(Rejection::CeilingExceeded);
        }
        if !within_bounds(next) {
            return Err(Rejection::InsufficientFunds);
        }

        Ok(next)
    }
}

impl FromStr for CommandKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(CommandKind::Deposit),
            "withdraw" => Ok(CommandKind::Withdraw),
            other => Err(format!("unknown transaction kind '{}'", other)),
        }
    }
}

/// Queue message body: `{"wallet_id": 1, "amount": 50.00}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandPayload {
    pub wallet_id: i64,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub wallet_id: WalletId,
    pub amount: Amount,
}

impl Command {
    pub fn new(kind: CommandKind, wallet_id: i64, amount: Decimal) -> Self {
        Command {
            kind,
            wallet_id: WalletId(wallet_id),
            amount: Amount(amount),
        }
    }

    /// Parses a raw delivery from the stream of `kind`.
    pub fn decode(kind: CommandKind, body: &[u8]) -> Result<Self, serde_json::Error> {
        let payload: CommandPayload = serde_json::from_slice(body)?;
        Ok(Command::new(kind, payload.wallet_id, payload.amount))
    }

    pub fn payload(&self) -> CommandPayload {
        CommandPayload {
            wallet_id: *self.wallet_id,
            amount: *self.amount,
        }
    }
}
