//! wgdigest CLI: IETF session transcripts in, a Markdown summary site out.
//!
//! `collect` fills the artifact cache and group manifests, `publish` renders
//! the site from the cache alone, and `run` does both.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
