//! Clap derive structures for the `zwbridge` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use zwbridge_core::{CommandClassId, NodeId};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// zwbridge -- inspect and drive a Z-Wave network through a driver gateway
#[derive(Debug, Parser)]
#[command(
    name = "zwbridge",
    version,
    about = "Inspect and control a Z-Wave network from the command line",
    long_about = "Mirrors the nodes and values of a Z-Wave network managed by a driver\n\
        gateway, and exposes pairing, value access and polling as commands.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Driver gateway WebSocket URL (overrides config)
    #[arg(long, short = 'g', env = "ZWBRIDGE_GATEWAY", global = true)]
    pub gateway: Option<String>,

    /// Path to the config file
    #[arg(long, env = "ZWBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "ZWBRIDGE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Seconds to wait for the connection and network scan
    #[arg(long, env = "ZWBRIDGE_SCAN_TIMEOUT", global = true)]
    pub scan_timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a serial port and connect the controller to it
    Connect(ConnectArgs),

    /// Show controller connection and scan status
    #[command(alias = "st")]
    Status,

    /// Start inclusion of a new device
    #[command(alias = "pair")]
    AddDevice(AddDeviceArgs),

    /// Start exclusion of a device
    #[command(alias = "unpair")]
    RemoveDevice,

    /// List registered devices
    #[command(alias = "ls", alias = "devices")]
    Nodes(NodesArgs),

    /// Show metadata and every value of a node
    Inspect(NodeArg),

    /// List the command classes a node reports values for
    Classes(NodeArg),

    /// Show the values of one command class
    Values(ValuesArgs),

    /// Read one or more values of a class instance
    Get(GetArgs),

    /// Ask a node to change a value
    Set(SetArgs),

    /// Turn driver polling of a class on or off
    Poll(PollArgs),

    /// Rename a node
    Rename(RenameArgs),

    /// Stream value, node and scene notifications
    Watch(WatchArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Per-command arguments ────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Serial port of the Z-Wave controller, e.g. /dev/ttyACM0
    pub port: String,
}

#[derive(Debug, Args)]
pub struct AddDeviceArgs {
    /// Use secure inclusion
    #[arg(long)]
    pub secure: bool,
}

#[derive(Debug, Args)]
pub struct NodesArgs {
    /// Only devices reporting values of this class (decimal or 0x hex)
    #[arg(long)]
    pub class: Option<CommandClassId>,

    /// Only devices whose name contains this text
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Args)]
pub struct NodeArg {
    /// Node id
    pub node: NodeId,
}

#[derive(Debug, Args)]
pub struct ValuesArgs {
    /// Node id
    pub node: NodeId,

    /// Command class (decimal or 0x hex)
    pub class: CommandClassId,

    /// Restrict to one instance
    #[arg(long, short = 'i')]
    pub instance: Option<u8>,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Node id
    pub node: NodeId,

    /// Command class (decimal or 0x hex)
    pub class: CommandClassId,

    /// Class instance
    pub instance: u8,

    /// One or more value indexes
    #[arg(required = true, num_args = 1..)]
    pub index: Vec<u16>,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Node id
    pub node: NodeId,

    /// Command class (decimal or 0x hex)
    pub class: CommandClassId,

    /// Class instance
    pub instance: u8,

    /// Value index
    pub index: u16,

    /// New value as JSON (`true`, `42`, `"Auto"`); bare words are sent as strings
    pub value: String,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("mode").required(true).args(["enable", "disable"])))]
pub struct PollArgs {
    /// Node id
    pub node: NodeId,

    /// Command class (decimal or 0x hex)
    pub class: CommandClassId,

    /// Start polling
    #[arg(long)]
    pub enable: bool,

    /// Stop polling
    #[arg(long)]
    pub disable: bool,
}

#[derive(Debug, Args)]
pub struct RenameArgs {
    /// Node id
    pub node: NodeId,

    /// New name
    pub name: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only notifications from this node
    #[arg(long, short = 'n')]
    pub node: Option<NodeId>,

    /// Stop after this many notifications
    #[arg(long)]
    pub count: Option<usize>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn class_ids_accept_hex() {
        let cli = Cli::try_parse_from(["zwbridge", "values", "5", "0x25", "--instance", "1"]);
        let Ok(Cli {
            command: Command::Values(args),
            ..
        }) = cli
        else {
            panic!("expected values command");
        };
        assert_eq!(args.node, NodeId(5));
        assert_eq!(args.class, CommandClassId(0x25));
        assert_eq!(args.instance, Some(1));
    }

    #[test]
    fn poll_requires_a_mode() {
        assert!(Cli::try_parse_from(["zwbridge", "poll", "5", "37"]).is_err());
        assert!(Cli::try_parse_from(["zwbridge", "poll", "5", "37", "--enable", "--disable"]).is_err());
        assert!(Cli::try_parse_from(["zwbridge", "poll", "5", "37", "--disable"]).is_ok());
    }

    #[test]
    fn get_takes_several_indexes() {
        let cli = Cli::try_parse_from(["zwbridge", "get", "5", "0x31", "1", "1", "4", "5"]);
        let Ok(Cli {
            command: Command::Get(args),
            ..
        }) = cli
        else {
            panic!("expected get command");
        };
        assert_eq!(args.index, vec![1, 4, 5]);
    }
}
