//! datpack CLI

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "datpack")]
#[command(author, version, about = "Pack and unpack single-file asset packages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bundle a directory of assets into a package file
    Pack {
        /// Directory of assets to bundle
        input_dir: PathBuf,
        /// Output package file (defaults to <input_dir>.dat)
        output: Option<PathBuf>,
    },
    /// Extract every asset from a package file
    Unpack {
        /// Group exported assets into per-category directories
        #[arg(long, short = 'd')]
        dirs: bool,
        /// Package file to extract
        input: PathBuf,
        /// Output directory (defaults to the package name without extension)
        output: Option<PathBuf>,
    },
    /// List the assets stored in a package file
    List {
        /// Package file to inspect
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Pack { input_dir, output } => cmd::pack::pack(&input_dir, output.as_deref()),
        Commands::Unpack {
            dirs,
            input,
            output,
        } => cmd::unpack::unpack(&input, output.as_deref(), dirs),
        Commands::List { input } => cmd::list::list(&input),
    }
}
