use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the syncdeck binary.
#[derive(Debug, Parser)]
#[command(
    name = "syncdeck",
    version,
    about = "Command-line client for the dashboard file manager and audit log"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "SYNCDECK_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the API base URL.
    #[arg(long = "base-url", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Override the bearer access token.
    #[arg(long = "access-token", value_name = "TOKEN", global = true)]
    pub access_token: Option<String>,

    /// Override the refresh token used to renew an expired access token.
    #[arg(long = "refresh-token", value_name = "TOKEN", global = true)]
    pub refresh_token: Option<String>,

    /// Override the per-request timeout.
    #[arg(long = "timeout-seconds", value_name = "SECONDS", global = true)]
    pub timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override how many unobserved entries the cache keeps.
    #[arg(long = "cache-idle-entry-limit", value_name = "COUNT", global = true)]
    pub cache_idle_entry_limit: Option<usize>,

    /// Toggle refetching observed entries after a mutation.
    #[arg(
        long = "cache-refetch-on-invalidate",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_refetch_on_invalidate: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Browse and modify the remote file tree.
    Files(FilesArgs),
    /// Query the audit log.
    Audit(AuditArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FilesArgs {
    #[command(subcommand)]
    pub action: FilesCmd,
}

#[derive(Debug, Subcommand, Clone)]
pub enum FilesCmd {
    /// List a directory.
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Include hidden entries.
        #[arg(long, short = 'a')]
        all: bool,
        /// Print raw JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Create a directory named NAME inside PARENT.
    Mkdir { parent: String, name: String },
    /// Delete a file or directory.
    Rm { path: String },
    /// Move or rename a file or directory.
    Mv { from: String, to: String },
    /// Copy a file or directory.
    Cp { from: String, to: String },
    /// Print the total size of a directory.
    Du { path: String },
    /// Upload a local file into a remote directory.
    Upload {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        /// Remote destination directory.
        #[arg(long, default_value = "/")]
        dest: String,
    },
    /// Print a directory listing every time it changes.
    Watch {
        path: String,
        /// Refresh cadence.
        #[arg(long = "interval-seconds", default_value_t = 5)]
        interval_seconds: u64,
        /// Stop after this many updates.
        #[arg(long)]
        count: Option<usize>,
    },
}

#[derive(Debug, Args, Clone)]
pub struct AuditArgs {
    #[command(subcommand)]
    pub action: AuditCmd,
}

#[derive(Debug, Subcommand, Clone)]
pub enum AuditCmd {
    /// List audit log entries.
    Ls {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long = "page-size", default_value_t = 20)]
        page_size: u32,
        #[arg(long)]
        search: Option<String>,
        /// Print raw JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}
