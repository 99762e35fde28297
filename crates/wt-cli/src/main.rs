mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wt",
    about = "Per-feature git worktrees with reserved port ranges and lifecycle hooks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .wt/ or .git/)
    #[arg(long, global = true, env = "WT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log lifecycle steps to stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize wt in the current project
    Init,

    /// Create a feature worktree, reserve its ports and run setup
    Up {
        /// Feature name
        feature: String,
    },

    /// Run cleanup, remove a feature worktree and release its ports
    Down {
        /// Feature name (auto-detected inside a feature tree)
        feature: Option<String>,
    },

    /// Run a configured command
    Run {
        /// Command name from config
        name: String,

        /// Feature name (auto-detected inside a feature tree)
        #[arg(short = 'f', long)]
        feature: Option<String>,
    },

    /// Start the configured dev services for a feature
    Dev {
        /// Feature name (auto-detected inside a feature tree)
        feature: Option<String>,
    },

    /// Show active feature worktrees with branch, ports and dirty state
    Status,

    /// Show the port allocation table
    Ports,

    /// Check the environment and configuration
    Doctor,

    /// Fetch the latest default branch from origin
    Refresh,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Up { feature } => cmd::up::run(&root, &feature, cli.json),
        Commands::Down { feature } => cmd::down::run(&root, feature.as_deref(), cli.json),
        Commands::Run { name, feature } => {
            cmd::run::run(&root, &name, feature.as_deref(), cli.json)
        }
        Commands::Dev { feature } => cmd::dev::run(&root, feature.as_deref(), cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Ports => cmd::ports::run(&root, cli.json),
        Commands::Doctor => cmd::doctor::run(&root, cli.json),
        Commands::Refresh => cmd::refresh::run(&root, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
