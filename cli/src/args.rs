use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::Level;

/// Manages Chern projects: a graph of tasks and algorithms, snapshotted
/// into impressions and run through DITE.
///
/// Without a subcommand or `-c`, starts the interactive shell.
#[derive(Parser, Clone)]
pub struct Args {
    /// A global log level to use when printing logs.
    /// It's also possible to set `RUST_LOG` according to
    /// `tracing_subscriber::filter::EnvFilter`, which will always have
    /// priority.
    #[arg(long, default_value_t=Level::INFO)]
    pub log_level: Level,

    /// Seconds to wait for DITE before treating it as unreachable.
    #[clap(long, env = "CHERN_DITE_TIMEOUT", default_value_t = 10)]
    pub dite_timeout: u64,

    /// Directory of the per-user project registry, `~/.chern` by default.
    #[clap(long, env = "CHERN_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Run a single shell command and exit.
    #[clap(short = 'c', long = "command")]
    pub command: Option<String>,

    #[command(subcommand)]
    pub subcommand: Option<Commands>,
}

impl Args {
    pub fn dite_timeout(&self) -> Duration {
        Duration::from_secs(self.dite_timeout)
    }
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Turn the current directory into a project and make it current.
    Init {
        /// Name of the project, the directory name by default.
        name: Option<String>,
    },
    /// Register an existing project and make it current.
    Use { path: PathBuf },
    /// List registered projects.
    Projects,
}
