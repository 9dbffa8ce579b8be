use derive_more::Display;

/// Domain validation outcome. Always recorded as an `error` transaction, never propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Rejection {
    #[display("deposit amount cannot be negative")]
    NegativeAmount,
    #[display("deposit amount exceeds the limit of 1,000,000,000")]
    AmountAboveCeiling,
    #[display("withdraw amount must be greater than 0")]
    NonPositiveAmount,
    #[display("insufficient balance for the withdrawal")]
    InsufficientFunds,
    #[display("deposit would exceed the balance limit of 1,000,000,000")]
    CeilingExceeded,
}

impl std::error::Error for Rejection {}
