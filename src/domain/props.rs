use std::str::FromStr;

use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shrinkwraprs::Shrinkwrap;
use uuid::Uuid;

/// System-wide maximum permissible wallet balance.
pub const BALANCE_CEILING: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

#[derive(
    Shrinkwrap, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, Hash, PartialOrd, Ord,
)]
pub struct WalletId(pub i64);

#[derive(Shrinkwrap, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, Hash)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn generate() -> Self {
        TransactionId(Uuid::new_v4())
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(TransactionId)
    }
}

#[derive(Shrinkwrap, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, Hash)]
pub struct Amount(pub Decimal);

/// True when the balance sits inside `[0, BALANCE_CEILING]`.
pub fn within_bounds(balance: Decimal) -> bool {
    balance >= Decimal::ZERO && balance <= BALANCE_CEILING
}
