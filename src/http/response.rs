// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Response envelopes returned to callers

use super::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Text-bodied response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub body: Option<String>,
    pub headers: HashMap<String, String>,
    pub status_code: u16,
}

impl HttpResponse {
    /// Parse the body as JSON. An empty body is the JSON string `""`.
    pub fn json_body(&self) -> Result<serde_json::Value> {
        let body = self.body.as_deref().unwrap_or_default();
        if body.trim().is_empty() {
            return Ok(serde_json::Value::String(String::new()));
        }
        serde_json::from_str(body).map_err(|_| {
            RelayError::MalformedResponse(format!(
                "Unable to read response message as json: {}",
                body
            ))
        })
    }
}

/// Byte-bodied response. `bodyBytes` travels as base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpByteResponse {
    #[serde(with = "base64_bytes")]
    pub body_bytes: Vec<u8>,
    pub body_size_in_mega_bytes: f64,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub status_code: u16,
}

impl HttpByteResponse {
    pub fn new(
        body_bytes: Vec<u8>,
        content_type: Option<String>,
        headers: HashMap<String, String>,
        status_code: u16,
    ) -> Self {
        Self {
            body_size_in_mega_bytes: size_in_megabytes(body_bytes.len()),
            body_bytes,
            content_type,
            headers,
            status_code,
        }
    }
}

/// Size in MiB rounded to three decimals.
pub fn size_in_megabytes(len: usize) -> f64 {
    (len as f64 / BYTES_PER_MEGABYTE * 1000.0).round() / 1000.0
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
