// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relay error kinds

/// Message used for every send failure that is not an external cancellation.
pub const SEND_FAILED_MESSAGE: &str = "HttpRequest was canceled, most likely due to a timeout.";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("{0}")]
    MalformedResponse(String),

    #[error("The operation was canceled.")]
    Cancelled,

    #[error("{}", SEND_FAILED_MESSAGE)]
    Timeout,

    #[error("Request to '{url}' failed with status code {status}.{}", body_suffix(.body))]
    UpstreamStatus {
        url: String,
        status: u16,
        body: Option<String>,
    },

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

fn body_suffix(body: &Option<String>) -> String {
    match body {
        Some(body) => format!(" Response body: {}", body),
        None => String::new(),
    }
}

impl RelayError {
    /// True only for cancellation requested by the caller.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<openssl::error::ErrorStack> for RelayError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::Certificate(err.to_string())
    }
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
