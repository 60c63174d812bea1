// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Show the effective configuration

use anyhow::Result;
use colored::Colorize;
use relayx::config::Config;
use std::path::PathBuf;

pub fn execute(path: Option<PathBuf>) -> Result<()> {
    let config = Config::load(path.as_deref())?;

    println!("{}", "# effective configuration".dimmed());
    println!("{}", toml::to_string_pretty(&config)?);
    println!(
        "{} {}",
        "# certificate store:".dimmed(),
        config.certificate_store_dir().display().to_string().cyan()
    );

    Ok(())
}
