// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Declarative description of one relayed call

use super::error::{RelayError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// An enum member on the wire: its name, or its ordinal as a number or
/// numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnumValue {
    Ordinal(u64),
    Name(String),
}

impl EnumValue {
    fn resolve<T>(self, members: &[T]) -> std::result::Result<T, String>
    where
        T: Copy + FromStr<Err = String>,
    {
        let ordinal = match self {
            EnumValue::Ordinal(ordinal) => ordinal,
            EnumValue::Name(name) => match name.trim().parse::<u64>() {
                Ok(ordinal) => ordinal,
                Err(_) => return name.parse(),
            },
        };

        usize::try_from(ordinal)
            .ok()
            .and_then(|index| members.get(index).copied())
            .map_or_else(|| ordinal.to_string().parse(), Ok)
    }
}

/// HTTP methods accepted by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "EnumValue")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Connect,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Head,
        Method::Options,
        Method::Connect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
        }
    }

    /// Only POST, PUT, PATCH and DELETE carry a request body.
    pub fn allows_content(&self) -> bool {
        matches!(
            self,
            Method::Post | Method::Put | Method::Patch | Method::Delete
        )
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unsupported HTTP method: {}", s))
    }
}

impl TryFrom<EnumValue> for Method {
    type Error = String;

    fn try_from(value: EnumValue) -> std::result::Result<Self, Self::Error> {
        value.resolve(&Method::ALL)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Connect => reqwest::Method::CONNECT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "EnumValue")]
pub enum Authentication {
    #[default]
    None,
    Basic,
    WindowsAuthentication,
    WindowsIntegratedSecurity,
    OAuth,
    ClientCertificate,
}

impl Authentication {
    const ALL: [Authentication; 6] = [
        Authentication::None,
        Authentication::Basic,
        Authentication::WindowsAuthentication,
        Authentication::WindowsIntegratedSecurity,
        Authentication::OAuth,
        Authentication::ClientCertificate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Authentication::None => "None",
            Authentication::Basic => "Basic",
            Authentication::WindowsAuthentication => "WindowsAuthentication",
            Authentication::WindowsIntegratedSecurity => "WindowsIntegratedSecurity",
            Authentication::OAuth => "OAuth",
            Authentication::ClientCertificate => "ClientCertificate",
        }
    }
}

impl FromStr for Authentication {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Authentication::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unsupported authentication: {}", s))
    }
}

impl TryFrom<EnumValue> for Authentication {
    type Error = String;

    fn try_from(value: EnumValue) -> std::result::Result<Self, Self::Error> {
        value.resolve(&Authentication::ALL)
    }
}

impl fmt::Display for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a client certificate is loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "EnumValue")]
pub enum CertificateSource {
    #[default]
    CertificateStore,
    File,
    String,
}

impl CertificateSource {
    const ALL: [CertificateSource; 3] = [
        CertificateSource::CertificateStore,
        CertificateSource::File,
        CertificateSource::String,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateSource::CertificateStore => "CertificateStore",
            CertificateSource::File => "File",
            CertificateSource::String => "String",
        }
    }
}

impl FromStr for CertificateSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CertificateSource::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| "Unsupported Certificate source".to_string())
    }
}

impl TryFrom<EnumValue> for CertificateSource {
    type Error = String;

    fn try_from(value: EnumValue) -> std::result::Result<Self, Self::Error> {
        value.resolve(&CertificateSource::ALL)
    }
}

impl fmt::Display for CertificateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single name/value header pair as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Header {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Full configuration for one outbound call.
///
/// JSON keys are matched without regard to case, see [`RequestOptions::from_json`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    pub method: Method,
    pub url: String,
    pub message: String,
    pub headers: Vec<Header>,

    pub authentication: Authentication,
    /// `domain\username` when using Windows authentication.
    pub username: String,
    pub password: String,
    /// Bearer token, sent as the Authorization header. Request scoped.
    pub token: String,

    #[serde(rename = "clientcertificatesource")]
    pub client_certificate_source: CertificateSource,
    #[serde(rename = "clientcertificatefilepath")]
    pub client_certificate_file_path: String,
    #[serde(rename = "clientcertificateinbase64")]
    pub client_certificate_in_base64: String,
    #[serde(rename = "clientcertificatekeyphrase")]
    pub client_certificate_key_phrase: String,
    #[serde(rename = "certificatethumbprint")]
    pub certificate_thumbprint: String,
    #[serde(rename = "loadentirechainforcertificate")]
    pub load_entire_chain_for_certificate: bool,

    #[serde(rename = "connectiontimeoutseconds")]
    pub connection_timeout_seconds: i64,
    #[serde(rename = "followredirects")]
    pub follow_redirects: bool,
    /// Accept every server certificate. Insecure, but on by default.
    #[serde(rename = "allowinvalidcertificate")]
    pub allow_invalid_certificate: bool,
    #[serde(rename = "allowinvalidresponsecontenttypecharset")]
    pub allow_invalid_response_content_type_charset: bool,
    #[serde(rename = "throwexceptiononerrorresponse")]
    pub throw_exception_on_error_response: bool,
    #[serde(rename = "automaticcookiehandling")]
    pub automatic_cookie_handling: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::Get,
            url: String::new(),
            message: String::new(),
            headers: Vec::new(),
            authentication: Authentication::None,
            username: String::new(),
            password: String::new(),
            token: String::new(),
            client_certificate_source: CertificateSource::CertificateStore,
            client_certificate_file_path: String::new(),
            client_certificate_in_base64: String::new(),
            client_certificate_key_phrase: String::new(),
            certificate_thumbprint: String::new(),
            load_entire_chain_for_certificate: true,
            connection_timeout_seconds: 60,
            follow_redirects: true,
            allow_invalid_certificate: true,
            allow_invalid_response_content_type_charset: true,
            throw_exception_on_error_response: true,
            automatic_cookie_handling: true,
        }
    }
}

impl RequestOptions {
    /// Parse options from a JSON document, ignoring key case and treating
    /// `null` members as absent.
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(normalize_keys(value))
            .map_err(|e| RelayError::Validation(format!("Invalid request options: {}", e)))
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| RelayError::Validation(format!("Invalid request options: {}", e)))?;
        Self::from_json(value)
    }
}

fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.to_ascii_lowercase(), normalize_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = RequestOptions::default();
        assert_eq!(options.method, Method::Get);
        assert_eq!(options.connection_timeout_seconds, 60);
        assert!(options.follow_redirects);
        assert!(options.allow_invalid_certificate);
        assert!(options.automatic_cookie_handling);
        assert!(options.throw_exception_on_error_response);
        assert!(options.load_entire_chain_for_certificate);
        assert_eq!(options.client_certificate_source, CertificateSource::CertificateStore);
    }

    #[test]
    fn test_from_json_ignores_key_case() {
        let options = RequestOptions::from_json(json!({
            "Method": "post",
            "URL": "http://localhost/x",
            "message": "hi",
            "Headers": [{"Name": "X-Test", "Value": "1"}],
            "authentication": "oauth",
            "Token": "abc",
            "ConnectionTimeoutSeconds": 5,
            "throwExceptionOnErrorResponse": false
        }))
        .unwrap();

        assert_eq!(options.method, Method::Post);
        assert_eq!(options.url, "http://localhost/x");
        assert_eq!(options.message, "hi");
        assert_eq!(options.headers, vec![Header::new("X-Test", "1")]);
        assert_eq!(options.authentication, Authentication::OAuth);
        assert_eq!(options.token, "abc");
        assert_eq!(options.connection_timeout_seconds, 5);
        assert!(!options.throw_exception_on_error_response);
        assert!(options.follow_redirects);
    }

    #[test]
    fn test_from_json_null_means_default() {
        let options = RequestOptions::from_json(json!({
            "url": "http://localhost",
            "message": null,
            "headers": null,
            "followRedirects": null
        }))
        .unwrap();

        assert_eq!(options.message, "");
        assert!(options.headers.is_empty());
        assert!(options.follow_redirects);
    }

    #[test]
    fn test_unknown_certificate_source_is_rejected() {
        let err = RequestOptions::from_json(json!({ "clientCertificateSource": "Smartcard" }))
            .unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
        assert!(err.to_string().contains("Unsupported Certificate source"));
    }

    #[test]
    fn test_enum_ordinals() {
        let options = RequestOptions::from_json(json!({
            "method": 4,
            "authentication": "1",
            "clientCertificateSource": 2
        }))
        .unwrap();
        assert_eq!(options.method, Method::Delete);
        assert_eq!(options.authentication, Authentication::Basic);
        assert_eq!(options.client_certificate_source, CertificateSource::String);

        let err = RequestOptions::from_json(json!({ "clientCertificateSource": 3 })).unwrap_err();
        assert!(err.to_string().contains("Unsupported Certificate source"));

        let err = RequestOptions::from_json(json!({ "method": 8 })).unwrap_err();
        assert!(err.to_string().contains("Unsupported HTTP method: 8"));
    }

    #[test]
    fn test_content_bearing_methods() {
        let bearing: Vec<_> = Method::ALL.iter().filter(|m| m.allows_content()).collect();
        assert_eq!(
            bearing,
            vec![&Method::Post, &Method::Put, &Method::Patch, &Method::Delete]
        );
    }
}
