//! BookChat CLI
//!
//! Operator tools for a BookChat board: post and read messages, inspect
//! what still has to be mirrored, and run the Git mirror sync by hand or on
//! a schedule.
//!
//! # Commands
//!
//! - `post` - Post a message
//! - `list` - List messages, newest first (or oldest first with `--since`)
//! - `show` - Show one message
//! - `pending` - List messages not yet mirrored
//! - `sync` - Run one sync pass against the Git mirror
//! - `status` - Show store statistics and mirror settings
//! - `run` - Run the sync scheduler until Ctrl-C
//!
//! Settings come from `BOOKCHAT_*` environment variables; flags override them.

mod commands;

use clap::{Parser, Subcommand};
use commands::{MirrorArgs, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// BookChat message board tools.
#[derive(Parser)]
#[command(name = "bookchat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Board data directory (overrides BOOKCHAT_DATA_DIR)
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Post a message
    Post {
        /// Message text
        content: String,
    },

    /// List messages, newest first
    List {
        /// Maximum number of messages
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip this many of the newest messages
        #[arg(short, long, default_value = "0")]
        offset: usize,

        /// Only messages after this id, oldest first
        #[arg(short, long, conflicts_with = "offset")]
        since: Option<u64>,
    },

    /// Show one message
    Show {
        /// Message id
        id: u64,
    },

    /// List messages not yet mirrored, oldest first
    Pending,

    /// Run one sync pass against the Git mirror
    Sync {
        #[command(flatten)]
        mirror: MirrorArgs,

        /// Show what would be mirrored without touching the mirror or the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Show store statistics and mirror settings
    Status {
        #[command(flatten)]
        mirror: MirrorArgs,
    },

    /// Run the sync scheduler until Ctrl-C
    Run {
        #[command(flatten)]
        mirror: MirrorArgs,

        /// Seconds between sync passes (overrides BOOKCHAT_SYNC_INTERVAL_SECS)
        #[arg(short, long)]
        interval_secs: Option<u64>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over the default level.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::board_config(cli.data_dir.as_deref())?;
    let format = cli.format;

    match cli.command {
        Commands::Post { content } => {
            commands::messages::post(config, content, format)?;
        }
        Commands::List {
            limit,
            offset,
            since,
        } => {
            commands::messages::list(config, limit, offset, since, format)?;
        }
        Commands::Show { id } => {
            commands::messages::show(config, id, format)?;
        }
        Commands::Pending => {
            commands::messages::pending(config, format)?;
        }
        Commands::Sync { mirror, dry_run } => {
            commands::sync::run_once(config, &mirror, dry_run, format)?;
        }
        Commands::Status { mirror } => {
            commands::sync::status(config, &mirror, format)?;
        }
        Commands::Run {
            mirror,
            interval_secs,
        } => {
            commands::sync::run_scheduler(config, &mirror, interval_secs)?;
        }
        Commands::Version => {
            println!("BookChat CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("BookChat Core v{}", bookchat_core::VERSION);
        }
    }

    Ok(())
}
