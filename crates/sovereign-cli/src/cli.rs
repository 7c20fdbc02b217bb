use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sovereign_core::models::Action;

#[derive(Parser)]
#[command(name = "sovereign")]
#[command(about = "Offline queue, cache and sync for Global Sovereign Covenant clients")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local store file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the JSON client config
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Push queued operations, then pull countries and projects
    Sync {
        /// Output the cycle report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push queued operations only (platform background task)
    BackgroundSync,
    /// Run the scheduler until interrupted
    Watch {
        /// Seconds between connectivity probes
        #[arg(long, default_value = "30", value_name = "SECS")]
        probe_interval: u64,
    },
    /// Show queue, cache and last sync state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and edit the operation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Inspect the content cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// List mirrored countries
    Countries {
        /// Number of rows to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List mirrored projects
    Projects {
        /// Number of rows to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the stored API session
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ActionArg {
    Create,
    Update,
    Delete,
}

impl From<ActionArg> for Action {
    fn from(value: ActionArg) -> Self {
        match value {
            ActionArg::Create => Self::Create,
            ActionArg::Update => Self::Update,
            ActionArg::Delete => Self::Delete,
        }
    }
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Queue a create/update/delete against a collection
    Add {
        #[arg(value_enum)]
        action: ActionArg,
        /// Target collection, e.g. `projects`
        collection: String,
        /// Record id (required for update and delete)
        #[arg(long, value_name = "ID")]
        id: Option<String>,
        /// JSON payload
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
    },
    /// List pending operations in replay order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List operations that exhausted their retries
    Failed {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a failed operation back to pending
    Requeue { id: i64 },
    /// Remove one operation
    Remove { id: i64 },
    /// Remove every queued operation
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Print one live cache entry
    Get { id: String },
    /// List live cache entries
    List {
        /// Only entries of this type
        #[arg(long = "type", value_name = "TYPE")]
        content_type: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete expired entries now
    Sweep,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store an access token as the current session
    LoginToken {
        /// Bearer token issued by the API
        #[arg(long, value_name = "TOKEN")]
        token: String,
        /// Token lifetime in seconds
        #[arg(long, value_name = "SECS")]
        expires_in: Option<i64>,
        /// Account email shown by `auth status`
        #[arg(long, value_name = "EMAIL")]
        email: Option<String>,
    },
    /// Show the stored session
    Status,
    /// Clear the stored session
    Logout,
}
