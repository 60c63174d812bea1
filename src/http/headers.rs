// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Header and content resolution

use super::error::{RelayError, Result};
use super::options::{Authentication, Header, RequestOptions};
use base64::Engine;
use bytes::Bytes;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

pub const AUTHORIZATION: &str = "authorization";

/// Headers keyed by name without regard to case. Keeps insertion order;
/// a repeated name overwrites the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<&'a Header> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = &'a Header>>(iter: I) -> Self {
        let mut set = HeaderSet::new();
        for header in iter {
            set.insert(header.name.clone(), header.value.clone());
        }
        set
    }
}

/// The caller's headers plus a synthesized Authorization header when the
/// caller did not supply one.
pub fn resolve_headers(headers: &[Header], options: &RequestOptions) -> HeaderSet {
    let mut resolved: HeaderSet = headers.iter().collect();

    if !resolved.contains(AUTHORIZATION) {
        if let Some(value) = authorization_value(options) {
            resolved.insert("Authorization", value);
        }
    }

    resolved
}

fn authorization_value(options: &RequestOptions) -> Option<String> {
    match options.authentication {
        Authentication::Basic => {
            let pair = format!("{}:{}", options.username, options.password);
            let ascii: String = pair
                .chars()
                .map(|c| if c.is_ascii() { c } else { '?' })
                .collect();
            Some(format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD.encode(ascii)
            ))
        }
        Authentication::OAuth => Some(format!("Bearer {}", options.token)),
        _ => None,
    }
}

/// Outbound body text, encoded, with the headers it would carry on its own.
#[derive(Debug, Clone)]
pub struct RequestContent {
    body: Bytes,
    headers: HeaderMap,
}

impl RequestContent {
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

/// Look up an encoding by charset label. Quoted labels are accepted.
pub fn encoding_for_charset(charset: &str) -> Option<&'static Encoding> {
    Encoding::for_label(charset.trim().trim_matches('"').as_bytes())
}

/// Encode text in `encoding`. encoding_rs only decodes UTF-16, so both
/// byte orders are written here.
pub fn encode_text(encoding: &'static Encoding, text: &str) -> Vec<u8> {
    if encoding == UTF_16LE {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    } else if encoding == UTF_16BE {
        text.encode_utf16().flat_map(u16::to_be_bytes).collect()
    } else {
        encoding.encode(text).0.into_owned()
    }
}

/// Encode `message` with the charset of a valid Content-Type header,
/// UTF-8 otherwise. A missing message is an empty body.
pub fn resolve_content(message: Option<&str>, headers: &HeaderSet) -> Result<RequestContent> {
    let message = message.unwrap_or_default();

    let declared = headers
        .get("content-type")
        .and_then(|value| value.parse::<mime::Mime>().ok());

    let encoding = match declared {
        Some(media_type) => match media_type.get_param(mime::CHARSET) {
            Some(charset) => encoding_for_charset(charset.as_str()).ok_or_else(|| {
                RelayError::Validation(format!(
                    "'{}' is not a supported encoding name.",
                    charset.as_str()
                ))
            })?,
            None => UTF_8,
        },
        None => UTF_8,
    };

    let mut content_headers = HeaderMap::new();
    let content_type = format!("text/plain; charset={}", encoding.name().to_ascii_lowercase());
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        content_headers.insert(CONTENT_TYPE, value);
    }

    Ok(RequestContent {
        body: Bytes::from(encode_text(encoding, message)),
        headers: content_headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(authentication: Authentication) -> RequestOptions {
        RequestOptions {
            authentication,
            username: "u".to_string(),
            password: "p".to_string(),
            token: "abc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_basic_auth_header() {
        let headers = resolve_headers(&[], &options(Authentication::Basic));
        assert_eq!(headers.get("Authorization"), Some("Basic dTpw"));
    }

    #[test]
    fn test_oauth_header() {
        let headers = resolve_headers(&[], &options(Authentication::OAuth));
        assert_eq!(headers.get("authorization"), Some("Bearer abc"));
    }

    #[test]
    fn test_explicit_authorization_wins() {
        for authentication in [Authentication::Basic, Authentication::OAuth, Authentication::None] {
            let supplied = vec![Header::new("AUTHORIZATION", "Custom xyz")];
            let headers = resolve_headers(&supplied, &options(authentication));
            assert_eq!(headers.len(), 1);
            assert_eq!(headers.get("Authorization"), Some("Custom xyz"));
        }
    }

    #[test]
    fn test_other_modes_add_nothing() {
        for authentication in [
            Authentication::None,
            Authentication::WindowsAuthentication,
            Authentication::WindowsIntegratedSecurity,
            Authentication::ClientCertificate,
        ] {
            assert!(resolve_headers(&[], &options(authentication)).is_empty());
        }
    }

    #[test]
    fn test_header_lookup_ignores_case_and_last_write_wins() {
        let supplied = vec![Header::new("X-Thing", "1"), Header::new("x-thing", "2")];
        let headers = resolve_headers(&supplied, &RequestOptions::default());
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-THING"), Some("2"));
    }

    #[test]
    fn test_content_uses_declared_charset() {
        let mut headers = HeaderSet::new();
        headers.insert("Content-Type", "text/plain; charset=iso-8859-1");
        let content = resolve_content(Some("é"), &headers).unwrap();
        assert_eq!(content.body().as_ref(), &[0xE9]);
        assert_eq!(
            content.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=windows-1252"
        );
    }

    #[test]
    fn test_content_in_utf16() {
        let mut headers = HeaderSet::new();
        headers.insert("Content-Type", "text/plain; charset=utf-16");
        let content = resolve_content(Some("A"), &headers).unwrap();
        assert_eq!(content.body().as_ref(), &[65, 0]);

        headers.insert("Content-Type", "text/plain; charset=utf-16be");
        let content = resolve_content(Some("Aé"), &headers).unwrap();
        assert_eq!(content.body().as_ref(), &[0, 65, 0, 0xE9]);
    }

    #[test]
    fn test_quoted_charset() {
        assert_eq!(encoding_for_charset("\"utf-8\""), Some(UTF_8));
        assert_eq!(encoding_for_charset(" latin1 "), Some(encoding_rs::WINDOWS_1252));

        let mut headers = HeaderSet::new();
        headers.insert("Content-Type", "text/plain; charset=\"iso-8859-1\"");
        let content = resolve_content(Some("é"), &headers).unwrap();
        assert_eq!(content.body().as_ref(), &[0xE9]);
    }

    #[test]
    fn test_content_defaults_to_utf8() {
        let mut headers = HeaderSet::new();
        headers.insert("content-type", "application/json");
        let content = resolve_content(Some("é"), &headers).unwrap();
        assert_eq!(content.body().as_ref(), "é".as_bytes());

        let content = resolve_content(Some("é"), &HeaderSet::new()).unwrap();
        assert_eq!(content.body().as_ref(), "é".as_bytes());
    }

    #[test]
    fn test_invalid_content_type_falls_back_to_default() {
        let mut headers = HeaderSet::new();
        headers.insert("content-type", "not a media type");
        let content = resolve_content(Some("x"), &headers).unwrap();
        assert_eq!(content.body().as_ref(), b"x");
    }

    #[test]
    fn test_unknown_charset_is_rejected() {
        let mut headers = HeaderSet::new();
        headers.insert("content-type", "text/plain; charset=klingon");
        assert!(matches!(
            resolve_content(Some("x"), &headers),
            Err(RelayError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_message_is_empty() {
        let mut content = resolve_content(None, &HeaderSet::new()).unwrap();
        assert!(content.body().is_empty());
        assert!(!content.headers().is_empty());
        content.clear_headers();
        assert!(content.headers().is_empty());
    }
}
