//! ShipIt CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shipit")]
#[command(about = "Firmware release pipeline for sensor fleets", long_about = None)]
struct Cli {
    /// Path to the release configuration file
    #[arg(long, env = "SHIPIT_CONFIG", default_value = "release.kdl")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: build, bundle, resolve, publish
    Run {
        /// Source-control ref that triggered this run (branch or tag)
        #[arg(long = "ref", env = "SHIPIT_REF")]
        ref_name: String,
        /// Release version override (defaults to `git describe`)
        #[arg(long)]
        version: Option<String>,
    },
    /// Build the firmware artifacts without bundling or publishing
    Build,
    /// Build and bundle without publishing
    Bundle {
        /// Release version override (defaults to `git describe`)
        #[arg(long)]
        version: Option<String>,
    },
    /// Show which deployment target a ref resolves to
    Resolve {
        /// Source-control ref to resolve
        ref_name: String,
    },
    /// Validate the release configuration
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { ref_name, version } => {
            commands::run::run(&cli.config, &ref_name, version).await
        }
        Commands::Build => commands::run::build(&cli.config).await,
        Commands::Bundle { version } => commands::run::bundle(&cli.config, version).await,
        Commands::Resolve { ref_name } => commands::resolve(&cli.config, &ref_name),
        Commands::Validate => commands::validate(&cli.config),
    }
}
