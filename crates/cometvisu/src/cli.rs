//! Clap derive structures for the `cometvisu` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// cometvisu -- talk to a CometVisu backend from the command line
#[derive(Debug, Parser)]
#[command(
    name = "cometvisu",
    version,
    about = "Log into CometVisu backends, watch addresses and write values",
    long_about = "A command-line client for the CometVisu protocol.\n\n\
        Speaks to the reference cgi-bin server, openHAB and openHAB 2 backends\n\
        using long-polling or server-sent events.",
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
    /// Server profile to use
    #[arg(long, short = 'p', env = "COMETVISU_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server origin, e.g. http://192.168.1.10:8080 (overrides profile)
    #[arg(long, short = 's', env = "COMETVISU_SERVER", global = true)]
    pub server: Option<String>,

    /// Backend preset or alias (default, openhab, openhab2, oh, oh2, cgi-bin)
    #[arg(long, short = 'b', env = "COMETVISU_BACKEND", global = true)]
    pub backend: Option<String>,

    /// Login user
    #[arg(long, short = 'u', env = "COMETVISU_USER", global = true)]
    pub user: Option<String>,

    /// Login password
    #[arg(long, env = "COMETVISU_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Device name sent with the login
    #[arg(long, env = "COMETVISU_DEVICE", global = true)]
    pub device: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "COMETVISU_OUTPUT",
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

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "COMETVISU_INSECURE", global = true)]
    pub insecure: bool,

    /// Connect timeout in seconds
    #[arg(long, env = "COMETVISU_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// JSON; streams emit one object per line
    Json,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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
    /// List the built-in backend presets
    Backends,

    /// Log in without starting a data stream and show the negotiated session
    Login,

    /// Subscribe to addresses and print updates as they arrive
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Write a value to an address
    Write(WriteArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch / Write ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Addresses to subscribe to
    #[arg(required = true, num_args = 1..)]
    pub addresses: Vec<String>,

    /// Server-side filter (repeatable)
    #[arg(long, short = 'f')]
    pub filter: Vec<String>,

    /// Exit after this many values
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Target address
    pub address: String,

    /// Encoded value to send
    pub value: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// Create or replace a profile from the global flags
    Init {
        /// Make this profile the default
        #[arg(long)]
        default: bool,

        /// Replace an existing profile of the same name
        #[arg(long)]
        force: bool,
    },

    /// Store a password in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
