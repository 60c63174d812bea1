// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tracing configuration and initialization.

use tracing_subscriber::{
    fmt::format::FmtSpan,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

pub const LOG_ENV: &str = "RELAYX_LOG";

pub struct Trc {
    env_filter: EnvFilter,
    spans: bool,
}

impl Default for Trc {
    fn default() -> Self {
        match EnvFilter::try_from_env(LOG_ENV).or_else(|_| EnvFilter::try_from_default_env()) {
            // An explicit filter usually means someone is debugging; show span lifecycles too.
            Ok(env_filter) => Self {
                env_filter,
                spans: true,
            },
            Err(_) => Self {
                env_filter: EnvFilter::new("info"),
                spans: false,
            },
        }
    }
}

impl Trc {
    /// `--verbose` wins over any environment filter.
    pub fn verbose(self, verbose: bool) -> Self {
        if verbose {
            Self {
                env_filter: EnvFilter::new("debug"),
                spans: true,
            }
        } else {
            self
        }
    }

    pub fn init(self) -> Result<(), TryInitError> {
        let span_events = if self.spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        tracing_subscriber::registry()
            .with(self.env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_span_events(span_events)
                    .compact(),
            )
            .try_init()
    }
}
