//! CleanBook CLI: classify, deduplicate and export browser bookmarks.
//!
//! Reads Netscape bookmark exports, sorts them into a category tree with
//! rules, learned preferences and optional LLM help, and writes the result
//! in several formats.

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
