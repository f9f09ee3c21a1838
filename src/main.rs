//! mdfetch CLI
//!
//! Fetch web articles as clean Markdown.
//! Falls back to headless Chrome where plain HTTP gets blocked or empty pages.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mdfetch::convert::{run_convert, ConvertArgs};
use mdfetch::list_adapters::{run_adapters, AdaptersArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mdfetch")]
#[command(author = "RoyalBit Inc.")]
#[command(version)]
#[command(about = "Fetch web articles as clean Markdown")]
#[command(long_about = "Falls back to headless Chrome where plain HTTP gets blocked or empty pages.\n\nCommands:\n  convert    Convert URLs or local HTML to Markdown files\n  adapters   List site adapters or resolve a URL\n\nLogging: MDFETCH_LOG=debug (or RUST_LOG)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert URLs or local HTML files to Markdown
    Convert(ConvertArgs),
    /// List site adapters or show which one handles a URL
    Adapters(AdaptersArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MDFETCH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("mdfetch=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Convert(args) => run_convert(args).await,
        Commands::Adapters(args) => run_adapters(args),
    }
}
