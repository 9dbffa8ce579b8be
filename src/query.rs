pub mod transaction;
pub mod wallet;
