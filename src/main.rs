// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! relayx - HTTP relay endpoint

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use relayx::trc::Trc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = Trc::default().verbose(cli.verbose).init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Serve { bind, config } => {
            cli::serve::execute(bind, config).await?;
        }
        Commands::Health {
            url,
            retries,
            retry_delay,
            timeout,
        } => {
            cli::health::execute(url, retries, retry_delay, timeout).await?;
        }
        Commands::Config { config } => {
            cli::config::execute(config)?;
        }
    }

    Ok(())
}
