//! holecache CLI - offline-capable forum reader
//!
//! Every listing read from the forum is captured locally as it streams, and `--offline`
//! replays those captures in the same order without touching the network.

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod logging;
mod output;

use cli::{Cli, Commands};
use commands::Context;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::initialize_logging(&cli)?;

    execute_command(cli).await
}

async fn execute_command(cli: Cli) -> Result<()> {
    let ctx = Context::load(&cli)?;

    match cli.command {
        Commands::Holes {
            order,
            division,
            resume,
            limit,
        } => {
            commands::list_holes(&ctx, order.map(Into::into), division, resume, limit).await?;
        },

        Commands::Floors {
            hole,
            newest_first,
            oldest_first,
            resume,
            offset,
            limit,
        } => {
            let reversed = if newest_first {
                Some(true)
            } else if oldest_first {
                Some(false)
            } else {
                None
            };
            commands::list_floors(&ctx, hole, reversed, resume, offset, limit).await?;
        },

        Commands::Session { hole } => commands::show_session(&ctx, hole)?,

        Commands::Config { path } => commands::show_config(&ctx, path)?,

        Commands::Reindex { kind } => commands::reindex(&ctx, kind.map(Into::into))?,
    }

    Ok(())
}
