use std::env;

use color_eyre::eyre::{OptionExt, Result};

pub struct CliArgs {
    pub wallets_file_path: String,
    pub commands_file_path: String,
    /// Where to save the transaction log, when given.
    pub transactions_file_path: Option<String>,
}

impl CliArgs {
    pub fn load() -> Result<Self> {
        let args: Vec<String> = env::args().collect();

        let wallets_file_path = args.get(1).ok_or_eyre("Wallets file not passed")?.to_owned();
        let commands_file_path = args
            .get(2)
            .ok_or_eyre("Commands file not passed")?
            .to_owned();
        let transactions_file_path = args.get(3).cloned();

        Ok(CliArgs {
            wallets_file_path,
            commands_file_path,
            transactions_file_path,
        })
    }
}
