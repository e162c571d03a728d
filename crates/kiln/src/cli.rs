use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Kiln: fetch, build and load plugins
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Configuration file (JSON, TOML or YAML). Defaults to ./kiln.toml when present
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the built artifacts
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Branch checked out for every repository plugin
    #[arg(long, global = true)]
    pub branch: Option<String>,

    /// Extra plugin keys, registered after the configured ones
    #[arg(short, long = "plugin", value_name = "KEY", global = true)]
    pub plugins: Vec<String>,

    /// Rebuild and retest the plugins given with --plugin
    #[arg(long, global = true)]
    pub update: bool,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show how a plugin key is interpreted
    Parse {
        /// The plugin key, e.g. "github.com/user/repo@v1.0.0 as name"
        key: String,
    },
    /// List registered plugins
    List,
    /// Clone or update every repository plugin
    Retrieve,
    /// Build every plugin
    Build(Batch),
    /// Run the tests of every plugin flagged for update
    Test(Batch),
    /// Retrieve, build, test, load and start every plugin, then close them
    Run {
        #[command(flatten)]
        batch: Batch,

        /// Handler to resolve once the plugins are started, e.g. "auth.Login"
        #[arg(long = "call", value_name = "HANDLER")]
        calls: Vec<String>,
    },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct Batch {
    /// Run on this many workers instead of one plugin at a time
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Run on the configured number of workers
    #[arg(short = 'P', long)]
    pub parallel: bool,
}
