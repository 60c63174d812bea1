// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound request execution

use super::client::ConfiguredClient;
use super::error::{RelayError, Result};
use super::headers::{encoding_for_charset, HeaderSet, RequestContent};
use super::options::{Method, RequestOptions};
use super::response::{HttpByteResponse, HttpResponse};
use bytes::Bytes;
use encoding_rs::UTF_8;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Headers that describe the body rather than the message.
pub const CONTENT_HEADERS: [&str; 11] = [
    "allow",
    "content-disposition",
    "content-encoding",
    "content-language",
    "content-length",
    "content-location",
    "content-md5",
    "content-range",
    "content-type",
    "expires",
    "last-modified",
];

pub fn is_content_header(name: &str) -> bool {
    CONTENT_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Where a header can be attached, in the order attachment is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderTarget {
    Request,
    Content,
}

const ATTACH_ORDER: [HeaderTarget; 2] = [HeaderTarget::Request, HeaderTarget::Content];

impl HeaderTarget {
    fn accepts(&self, name: &HeaderName, has_content: bool) -> bool {
        match self {
            HeaderTarget::Request => !is_content_header(name.as_str()),
            HeaderTarget::Content => has_content && is_content_header(name.as_str()),
        }
    }
}

/// Result of attaching one header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderOutcome {
    pub name: String,
    /// `None` when every target refused the header.
    pub target: Option<HeaderTarget>,
}

#[derive(Debug, Default)]
pub struct PlacedHeaders {
    pub request: HeaderMap,
    pub content: HeaderMap,
    pub outcomes: Vec<HeaderOutcome>,
}

/// Route every resolved header to the request, the content, or nowhere.
pub fn place_headers(headers: &HeaderSet, has_content: bool) -> PlacedHeaders {
    let mut placed = PlacedHeaders::default();

    for (name, value) in headers.iter() {
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .ok()
            .zip(HeaderValue::from_str(value).ok());

        let target = parsed.and_then(|(header_name, header_value)| {
            let target = ATTACH_ORDER
                .into_iter()
                .find(|target| target.accepts(&header_name, has_content))?;
            match target {
                HeaderTarget::Request => placed.request.append(header_name, header_value),
                HeaderTarget::Content => placed.content.append(header_name, header_value),
            };
            Some(target)
        });

        match target {
            Some(target) => debug!(header = name, ?target, "attached header"),
            None if has_content => warn!(header = name, "could not add header"),
            None => debug!(header = name, "dropped header without content"),
        }

        placed.outcomes.push(HeaderOutcome {
            name: name.to_string(),
            target,
        });
    }

    placed
}

/// Downstream response, body fully read.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub url: String,
    pub status: u16,
    success: bool,
    headers: HeaderMap,
    content_headers: HeaderMap,
    body: Bytes,
}

impl UpstreamResponse {
    fn new(url: String, status: reqwest::StatusCode, all_headers: &HeaderMap, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        let mut content_headers = HeaderMap::new();
        for (name, value) in all_headers.iter() {
            if is_content_header(name.as_str()) {
                content_headers.append(name.clone(), value.clone());
            } else {
                headers.append(name.clone(), value.clone());
            }
        }

        Self {
            url,
            status: status.as_u16(),
            success: status.is_success(),
            headers,
            content_headers,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn content_type(&self) -> Option<String> {
        self.content_headers
            .get(CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
    }

    /// Remove the charset parameter from the declared content type.
    pub fn strip_charset(&mut self) {
        let stripped = self
            .content_headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<mime::Mime>().ok())
            .map(|media_type| without_charset(&media_type))
            .and_then(|v| HeaderValue::from_str(&v).ok());

        if let Some(value) = stripped {
            self.content_headers.insert(CONTENT_TYPE, value);
        }
    }

    /// Content headers overlaid with response headers, values joined by `;`.
    pub fn flattened_headers(&self) -> HashMap<String, String> {
        let mut all = join_values(&self.content_headers);
        all.extend(join_values(&self.headers));
        all
    }

    /// Decode the body using the declared charset, UTF-8 when none is declared.
    pub fn text(&self) -> Result<String> {
        let charset = self
            .content_type()
            .and_then(|v| v.parse::<mime::Mime>().ok())
            .and_then(|m| m.get_param(mime::CHARSET).map(|c| c.as_str().to_string()));

        let encoding = match charset {
            Some(charset) => encoding_for_charset(&charset).ok_or_else(|| {
                RelayError::MalformedResponse(format!(
                    "The character set provided in ContentType is invalid: '{}'",
                    charset
                ))
            })?,
            None => UTF_8,
        };

        let (text, _, _) = encoding.decode(&self.body);
        Ok(text.into_owned())
    }

    /// Like [`text`](Self::text), but an unusable charset falls back to lossy UTF-8.
    pub fn text_lossy(&self) -> String {
        self.text()
            .unwrap_or_else(|_| String::from_utf8_lossy(&self.body).into_owned())
    }

    /// Error statuses never fail on the body charset; only successful
    /// responses insist on a decodable one.
    pub fn into_text_response(self, throw_on_error: bool) -> Result<HttpResponse> {
        let body = if self.success {
            self.text()?
        } else {
            self.text_lossy()
        };

        if !self.success && throw_on_error {
            return Err(RelayError::UpstreamStatus {
                url: self.url,
                status: self.status,
                body: Some(body),
            });
        }

        Ok(HttpResponse {
            body: Some(body),
            headers: self.flattened_headers(),
            status_code: self.status,
        })
    }

    pub fn into_byte_response(self, throw_on_error: bool) -> Result<HttpByteResponse> {
        if !self.success && throw_on_error {
            return Err(RelayError::UpstreamStatus {
                url: self.url,
                status: self.status,
                body: None,
            });
        }

        let content_type = self.content_type();
        let headers = self.flattened_headers();
        Ok(HttpByteResponse::new(
            self.body.to_vec(),
            content_type,
            headers,
            self.status,
        ))
    }
}

fn without_charset(media_type: &mime::Mime) -> String {
    let mut value = media_type.essence_str().to_string();
    for (name, param) in media_type.params() {
        if name != mime::CHARSET {
            value.push_str(&format!("; {}={}", name, param));
        }
    }
    value
}

fn offers_basic_challenge(headers: &HeaderMap) -> bool {
    headers.get_all(WWW_AUTHENTICATE).iter().any(|value| {
        value
            .to_str()
            .map(|v| v.trim_start().to_ascii_lowercase().starts_with("basic"))
            .unwrap_or(false)
    })
}

fn join_values(map: &HeaderMap) -> HashMap<String, String> {
    map.keys()
        .map(|name| {
            let joined = map
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(";");
            (name.as_str().to_string(), joined)
        })
        .collect()
}

/// Issue one request. There is no retry; the only second send answers a
/// `Basic` challenge with the client's stored network credentials.
///
/// External cancellation surfaces as [`RelayError::Cancelled`]; every other
/// send failure, timeouts included, as [`RelayError::Timeout`].
pub async fn execute(
    client: &ConfiguredClient,
    method: Method,
    url: &str,
    content: RequestContent,
    headers: &HeaderSet,
    options: &RequestOptions,
    cancel: &CancellationToken,
) -> Result<UpstreamResponse> {
    if cancel.is_cancelled() {
        return Err(RelayError::Cancelled);
    }

    let target = Url::parse(url).map_err(|e| RelayError::Validation(format!("Invalid URI '{}': {}", url, e)))?;

    let mut content = method.allows_content().then_some(content);
    if let Some(content) = content.as_mut() {
        content.clear_headers();
    }

    let placed = place_headers(headers, content.is_some());
    let challenge_response = if placed.request.contains_key(AUTHORIZATION) {
        None
    } else {
        client.challenge_response()
    };

    let mut request = client
        .inner()
        .request(method.into(), target)
        .headers(placed.request);

    if let Some(content) = content {
        let mut content_headers = placed.content;
        if !content_headers.contains_key(CONTENT_TYPE) {
            content_headers.insert(CONTENT_TYPE, client.default_content_type().clone());
        }
        request = request.headers(content_headers).body(content.into_body());
    }

    let challenge_retry = challenge_response
        .and_then(|value| request.try_clone().map(|retry| retry.header(AUTHORIZATION, value)));

    let exchange = async {
        let mut response = request.send().await?;
        if let Some(retry) = challenge_retry {
            if response.status() == reqwest::StatusCode::UNAUTHORIZED
                && offers_basic_challenge(response.headers())
            {
                debug!("answering basic challenge with stored credentials");
                response = retry.send().await?;
            }
        }
        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, response_headers, body))
    };

    let (status, response_headers, body) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(RelayError::Cancelled),
        result = exchange => result.map_err(|e| {
            debug!(error = %e, "send failed");
            RelayError::Timeout
        })?,
    };

    let mut response = UpstreamResponse::new(url.to_string(), status, &response_headers, body);

    if options.allow_invalid_response_content_type_charset {
        response.strip_charset();
    }

    Ok(response)
}
