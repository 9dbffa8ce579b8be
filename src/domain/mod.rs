pub mod command;
pub mod error;
pub mod props;
pub mod transaction;
