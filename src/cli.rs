use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "castsync",
    about = "Mirror a character catalogue and its images for offline use"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding the cache database and image directories
    #[arg(long, global = true, default_value = "~/.castsync")]
    pub data_dir: String,

    /// Firestore project id
    #[arg(long, global = true, env = "CASTSYNC_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Firestore web API key.
    /// WARNING: passing via --api-key is visible in process listings.
    /// Prefer the CASTSYNC_API_KEY environment variable instead.
    #[arg(long, global = true, env = "CASTSYNC_API_KEY")]
    pub api_key: Option<String>,

    /// Collection holding the character documents
    #[arg(long, global = true, default_value = "characters")]
    pub collection: String,

    /// Firestore REST endpoint
    #[arg(long, global = true, default_value = "https://firestore.googleapis.com")]
    pub base_url: String,

    /// host:port dialled to decide whether the network is reachable
    #[arg(long, global = true)]
    pub probe_addr: Option<String>,

    /// Connectivity probe timeout in seconds
    #[arg(long, global = true, default_value_t = 3)]
    pub probe_timeout_secs: u64,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Treat the network as unavailable and serve only cached data
    #[arg(long, global = true)]
    pub offline: bool,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Refresh from the remote once and print the character list (default)
    Sync,

    /// Refresh repeatedly until interrupted
    Watch(WatchArgs),

    /// Print the cached character list without network access
    List,

    /// Show cache summary
    Status,

    /// Delete the cache database and image directories
    ResetState(ResetStateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Seconds to wait between refreshes
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ResetStateArgs {
    /// Skip confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

impl Cli {
    /// Subcommand to run; `sync` when none was given.
    pub fn effective_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Sync)
    }
}
