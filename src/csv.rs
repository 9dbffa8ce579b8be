use color_eyre::eyre::{Result, eyre};
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::command::CommandKind;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CsvWalletRecord {
    #[serde(rename = "wallet")]
    pub wallet_id: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CsvCommandRecord {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(rename = "wallet")]
    pub wallet_id: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

pub fn read_input<D: serde::de::DeserializeOwned>(
    file_path: &str,
) -> Result<impl Iterator<Item = Result<D>>> {
    let reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(file_path)
        .map_err(|e| eyre!("Could not read input file: {}", e))?;

    Ok(reader
        .into_deserialize()
        .map(|r| r.map_err(|ee| eyre!("Error parsing row: {}", ee))))
}
