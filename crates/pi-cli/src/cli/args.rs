use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pi", version, about = "Maintenance tool for the Pi Engine data layer")]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database file, overrides the configuration
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create missing tables
    Init,
    /// Purge expired user data
    Gc,
    /// Inspect or invalidate cached registries
    Registry(RegistryArgs),
    /// Read and write user data items
    Data(DataArgs),
}

#[derive(Args)]
pub struct RegistryArgs {
    #[arg(value_enum)]
    pub action: RegistryAction,

    #[arg(value_enum)]
    pub kind: RegistryKind,

    /// Section to load; every section for roles when omitted
    #[arg(long)]
    pub section: Option<String>,

    /// Load routes of every section except `--section`
    #[arg(long)]
    pub exclude: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RegistryAction {
    Read,
    Create,
    Clear,
    Flush,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RegistryKind {
    Role,
    Route,
}

#[derive(Args)]
pub struct DataArgs {
    #[arg(value_enum)]
    pub action: DataAction,

    #[arg(long)]
    pub uid: Vec<i64>,

    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub module: Option<String>,

    /// Integer, JSON object or array, or plain text
    #[arg(long)]
    pub value: Option<String>,

    /// Seconds to live, 0 for no expiry
    #[arg(long, default_value_t = 0)]
    pub ttl: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DataAction {
    Get,
    Set,
    Incr,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_command() {
        let cli = Cli::try_parse_from([
            "pi", "--db", "x.db", "registry", "read", "route", "--section", "admin", "--exclude",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        match cli.cmd {
            Command::Registry(args) => {
                assert_eq!(args.action, RegistryAction::Read);
                assert_eq!(args.kind, RegistryKind::Route);
                assert_eq!(args.section.as_deref(), Some("admin"));
                assert!(args.exclude);
            }
            _ => panic!("expected registry command"),
        }
    }

    #[test]
    fn parses_data_command_with_repeated_uids() {
        let cli = Cli::try_parse_from([
            "pi", "data", "get", "--uid", "1", "--uid", "2", "--name", "theme",
        ])
        .unwrap();
        match cli.cmd {
            Command::Data(args) => {
                assert_eq!(args.action, DataAction::Get);
                assert_eq!(args.uid, vec![1, 2]);
                assert_eq!(args.ttl, 0);
                assert!(args.module.is_none());
            }
            _ => panic!("expected data command"),
        }
    }
}
