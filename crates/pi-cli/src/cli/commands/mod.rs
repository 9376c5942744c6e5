use super::args::*;
use anyhow::Context;
use pi_core::{load_config, DataLayer};

pub mod data;
pub mod registry;

use crate::exit_codes::SUCCESS;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    let layer = DataLayer::open(&config)
        .with_context(|| format!("open database {}", config.database.path.display()))?;

    match cli.cmd {
        Command::Init => {
            tracing::info!(path = %config.database.path.display(), "schema ready");
            Ok(SUCCESS)
        }
        Command::Gc => {
            let removed = layer.user_data.gc()?;
            println!("{}", removed);
            Ok(SUCCESS)
        }
        Command::Registry(args) => registry::run(&layer, args),
        Command::Data(args) => data::run(&layer, args),
    }
}

pub(crate) fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
