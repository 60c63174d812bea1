// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wait for a relay to be ready (health check)

use anyhow::{Context, Result};
use colored::Colorize;
use std::time::Duration;
use tokio::time::sleep;

pub async fn execute(url: String, retries: u32, retry_delay: u64, timeout: u64) -> Result<()> {
    println!("{}", "Waiting for relay to be ready...".cyan());
    println!("Health check: {}", url);
    println!("Max retries: {}, delay: {}ms, timeout: {}ms", retries, retry_delay, timeout);
    println!();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout))
        .build()
        .context("Failed to create HTTP client")?;

    for attempt in 1..=retries {
        print!("Attempt {}/{}: ", attempt, retries);

        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                println!("{} (status: {})", "OK".green(), response.status().as_u16());
                println!();
                println!("{}", "Relay is ready!".green().bold());
                return Ok(());
            }
            Ok(response) => {
                println!("{} (status: {})", "FAIL".red(), response.status().as_u16());
            }
            Err(e) => {
                println!("{} ({})", "FAIL".red(), e);
            }
        }

        if attempt < retries {
            sleep(Duration::from_millis(retry_delay)).await;
        }
    }

    println!();
    println!("{}", "Relay did not become ready in time".red().bold());
    std::process::exit(2);
}
