// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI module - Command line interface definitions and handlers

pub mod config;
pub mod health;
pub mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// relayx - HTTP relay endpoint
#[derive(Parser, Debug)]
#[command(name = "relayx")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay HTTP server
    Serve {
        /// Address to listen on, overrides the config file
        #[arg(short, long, env = "RELAYX_BIND")]
        bind: Option<String>,

        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Wait for a relay to be ready
    Health {
        /// Health check URL
        #[arg(long, default_value = "http://127.0.0.1:5298/api/healthcheck")]
        url: String,

        /// Maximum retries
        #[arg(long, default_value = "30")]
        retries: u32,

        /// Delay between retries in milliseconds
        #[arg(long, default_value = "2000")]
        retry_delay: u64,

        /// Request timeout in milliseconds
        #[arg(long, default_value = "5000")]
        timeout: u64,
    },

    /// Print the effective configuration
    Config {
        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
