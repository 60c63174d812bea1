// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run the relay server until Ctrl-C

use anyhow::{Context, Result};
use relayx::config::Config;
use relayx::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub async fn execute(bind: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = Config::load(config_path.as_deref())?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    let state = Arc::new(AppState::from_config(&config));
    info!(
        store = %config.certificate_store_dir().display(),
        idle_ttl_secs = config.cache.idle_ttl_secs,
        "relay configured"
    );

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutting down"),
            Err(e) => warn!(error = %e, "could not listen for ctrl-c, shutting down"),
        }
        shutdown.cancel();
    });

    server::run(listener, state, &config.server)
        .await
        .context("Server error")
}
