//! gitfuse CLI - mount GitHub repositories as a read-only filesystem.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::limits::OutputFormat;

#[derive(Parser)]
#[command(name = "gitfuse")]
#[command(version)]
#[command(about = "Mount GitHub users' and organizations' repositories as a read-only filesystem")]
#[command(
    long_about = "gitfuse lists the repositories of the configured GitHub users and \
organizations and exposes them as /<owner>/<repo>/... under a FUSE mount point. \
Repository listings are refreshed in the background; file trees and contents are \
fetched on first access. The filesystem is read-only."
)]
#[command(after_long_help = r#"EXAMPLES
    Mount a user's and an organization's repositories:
        $ gitfuse mount ~/github --users alice --orgs rust-lang

    Refresh listings every minute:
        $ gitfuse mount ~/github --users alice --update-rate 60

    Check configuration and token without mounting:
        $ gitfuse list --users alice

    Show remaining API quota:
        $ gitfuse limits

    Generate shell completions:
        $ gitfuse completions bash > ~/.local/share/bash-completion/completions/gitfuse

CONFIGURATION
    gitfuse reads configuration from:
      1. ~/.config/gitfuse/config.toml (or $XDG_CONFIG_HOME/gitfuse/config.toml)
      2. ./gitfuse.toml
      3. Environment variables (GITFUSE_* prefix, e.g., GITFUSE_MOUNT__UPDATE_RATE)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    GITFUSE_GITHUB_TOKEN          GitHub personal access token
    GITFUSE_GITHUB__API_URL       REST API base URL (GitHub Enterprise)
    GITFUSE_MOUNT__USERS          Comma-separated GitHub usernames
    GITFUSE_MOUNT__ORGS           Comma-separated organization names
    GITFUSE_MOUNT__UPDATE_RATE    Seconds between listing refreshes (default: 300)
    GITFUSE_CACHE__DIR            ETag cache directory (default: ~/.cache/gitfuse)
    RUST_LOG                      Log filter, overrides --verbose
"#)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which owners to expose and how to authenticate.
#[derive(Debug, Clone, clap::Args)]
struct OwnerArgs {
    /// GitHub usernames (replaces mount.users from the config file)
    #[arg(short, long, value_delimiter = ',')]
    users: Vec<String>,

    /// GitHub organization names (replaces mount.orgs from the config file)
    #[arg(short, long, value_delimiter = ',')]
    orgs: Vec<String>,

    /// File containing the GitHub token (first line)
    #[arg(short, long)]
    token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
struct MountArgs {
    /// Directory to mount the filesystem on
    mount_point: PathBuf,

    #[command(flatten)]
    owners: OwnerArgs,

    /// Seconds between repository listing refreshes (default from config or 300)
    #[arg(short = 'r', long)]
    update_rate: Option<f64>,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Leave the mount in place if the process dies
    #[arg(long)]
    no_auto_unmount: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the filesystem and keep it refreshed until Ctrl+C
    Mount(MountArgs),
    /// Fetch repository listings once and print them
    List {
        #[command(flatten)]
        owners: OwnerArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show GitHub API rate limits for the configured token
    Limits {
        /// File containing the GitHub token (first line)
        #[arg(short, long)]
        token_file: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,

        /// Directory to write the script to (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Handle commands that don't need logging or configuration first
    match &cli.command {
        Commands::Completions { shell, output } => {
            commands::meta::handle_completions(*shell, output.clone())?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if cli.verbose => EnvFilter::new("gitfuse=debug,gitfuse_cli=debug"),
        Err(_) => EnvFilter::new("gitfuse=info,gitfuse_cli=info"),
    };

    // Logs go to stderr so table and JSON output stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let shutdown = shutdown::setup_shutdown_handler();

    match cli.command {
        Commands::Mount(args) => {
            commands::mount::handle_mount(args, &config, shutdown).await?;
        }
        Commands::List { owners, output } => {
            commands::list::handle_list(owners, output, &config, shutdown).await?;
        }
        Commands::Limits { token_file, output } => {
            commands::limits::handle_limits(output, token_file.as_deref(), &config).await?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
