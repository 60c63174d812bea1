// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP client configuration

use super::certs::{self, CertificateLoader};
use super::error::{RelayError, Result};
use super::options::{Authentication, RequestOptions};
use base64::Engine;
use reqwest::header::HeaderValue;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_REDIRECTS: usize = 50;

/// Credentials bound to a client at the handler level.
///
/// Network credentials answer a server's `Basic` challenge. NTLM and
/// Negotiate challenges are not answered, and `DefaultEnvironment` carries
/// no secret of its own, so such servers see the unauthenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    None,
    /// Credentials of the account the relay runs as.
    DefaultEnvironment,
    Network(NetworkCredential),
}

#[derive(Clone, PartialEq, Eq)]
pub struct NetworkCredential {
    pub domain: String,
    pub user_name: String,
    password: String,
}

impl NetworkCredential {
    /// Split a `domain\username` pair.
    pub fn from_windows_username(username: &str, password: &str) -> Result<Self> {
        match username.split('\\').collect::<Vec<_>>().as_slice() {
            [domain, user_name] => Ok(Self {
                domain: domain.to_string(),
                user_name: user_name.to_string(),
                password: password.to_string(),
            }),
            _ => Err(RelayError::Validation(format!(
                "Username needs to be 'domain\\username' now it was '{}'",
                username
            ))),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// `Authorization` value answering a `Basic` challenge, user given as `domain\user`.
    pub fn basic_authorization(&self) -> String {
        let pair = format!("{}\\{}:{}", self.domain, self.user_name, self.password);
        format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(pair))
    }
}

impl fmt::Debug for NetworkCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkCredential")
            .field("domain", &self.domain)
            .field("user_name", &self.user_name)
            .finish_non_exhaustive()
    }
}

/// A reusable HTTP client bound to one handler configuration.
///
/// Read-only once built; shared between every request with the same
/// client-level options.
pub struct ConfiguredClient {
    inner: reqwest::Client,
    credentials: Credentials,
    timeout: Duration,
    default_content_type: HeaderValue,
    certificate_count: usize,
}

impl ConfiguredClient {
    /// Build a client for the client-level part of `options`.
    ///
    /// The underlying client never sends `Expect: 100-continue`.
    pub fn build(options: &RequestOptions, loader: &CertificateLoader) -> Result<Self> {
        if options.connection_timeout_seconds <= 0 {
            return Err(RelayError::Validation(format!(
                "Timeout must be a positive number of seconds, was {}",
                options.connection_timeout_seconds
            )));
        }
        let timeout = Duration::from_secs(options.connection_timeout_seconds as u64);

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .cookie_store(options.automatic_cookie_handling);

        if options.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        let mut credentials = Credentials::None;
        let mut certificate_count = 0;

        match options.authentication {
            Authentication::WindowsIntegratedSecurity => {
                credentials = Credentials::DefaultEnvironment;
            }
            Authentication::WindowsAuthentication => {
                credentials = Credentials::Network(NetworkCredential::from_windows_username(
                    &options.username,
                    &options.password,
                )?);
            }
            Authentication::ClientCertificate => {
                let certificates = loader.load(options)?;
                certificate_count = certificates.len();
                builder = builder.identity(certs::identity(&certificates)?);
            }
            Authentication::None | Authentication::Basic | Authentication::OAuth => {}
        }

        if options.allow_invalid_certificate {
            warn!("server certificate validation is disabled for this client");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let inner = builder
            .build()
            .map_err(|e| RelayError::Client(e.to_string()))?;

        debug!(
            authentication = %options.authentication,
            certificates = certificate_count,
            timeout_secs = timeout.as_secs(),
            "built HTTP client"
        );

        Ok(Self {
            inner,
            credentials,
            timeout,
            default_content_type: HeaderValue::from_static("application/json"),
            certificate_count,
        })
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Authorization to send when the server issues a `Basic` challenge.
    pub fn challenge_response(&self) -> Option<HeaderValue> {
        match &self.credentials {
            Credentials::Network(credential) => {
                HeaderValue::from_str(&credential.basic_authorization()).ok()
            }
            Credentials::None | Credentials::DefaultEnvironment => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Content type for bodies sent without one.
    pub fn default_content_type(&self) -> &HeaderValue {
        &self.default_content_type
    }

    pub fn certificate_count(&self) -> usize {
        self.certificate_count
    }
}

impl fmt::Debug for ConfiguredClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredClient")
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .field("certificate_count", &self.certificate_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::certs::testutil::make_cert;
    use crate::http::certs::CertificateStore;
    use crate::http::options::CertificateSource;
    use base64::Engine;

    fn loader() -> CertificateLoader {
        CertificateLoader::new(CertificateStore::open("/nonexistent/store"))
    }

    #[test]
    fn test_windows_authentication_requires_domain() {
        let options = RequestOptions {
            authentication: Authentication::WindowsAuthentication,
            username: "justuser".to_string(),
            ..Default::default()
        };
        let err = ConfiguredClient::build(&options, &loader()).unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Username needs to be 'domain\\username' now it was 'justuser'"
        );

        let options = RequestOptions {
            username: "a\\b\\c".to_string(),
            ..options
        };
        assert!(ConfiguredClient::build(&options, &loader()).is_err());
    }

    #[test]
    fn test_windows_authentication_credentials() {
        let options = RequestOptions {
            authentication: Authentication::WindowsAuthentication,
            username: "CORP\\alice".to_string(),
            password: "pw".to_string(),
            ..Default::default()
        };
        let client = ConfiguredClient::build(&options, &loader()).unwrap();
        match client.credentials() {
            Credentials::Network(credential) => {
                assert_eq!(credential.domain, "CORP");
                assert_eq!(credential.user_name, "alice");
                assert_eq!(credential.password(), "pw");
                assert!(!format!("{:?}", credential).contains("pw"));
                assert_eq!(
                    credential.basic_authorization(),
                    format!(
                        "Basic {}",
                        base64::engine::general_purpose::STANDARD.encode("CORP\\alice:pw")
                    )
                );
            }
            other => panic!("unexpected credentials: {:?}", other),
        }
    }

    #[test]
    fn test_integrated_security_uses_default_credentials() {
        let options = RequestOptions {
            authentication: Authentication::WindowsIntegratedSecurity,
            ..Default::default()
        };
        let client = ConfiguredClient::build(&options, &loader()).unwrap();
        assert_eq!(client.credentials(), &Credentials::DefaultEnvironment);
        assert!(client.challenge_response().is_none());
    }

    #[test]
    fn test_header_level_auth_modes_leave_handler_alone() {
        for authentication in [Authentication::None, Authentication::Basic, Authentication::OAuth] {
            let options = RequestOptions {
                authentication,
                ..Default::default()
            };
            let client = ConfiguredClient::build(&options, &loader()).unwrap();
            assert_eq!(client.credentials(), &Credentials::None);
            assert_eq!(client.certificate_count(), 0);
            assert_eq!(client.timeout(), Duration::from_secs(60));
            assert_eq!(client.default_content_type(), "application/json");
        }
    }

    #[test]
    fn test_client_certificate_from_string() {
        let (cert, key) = make_cert("client", None);
        let mut pem = cert.to_pem().unwrap();
        pem.extend_from_slice(&key.private_key_to_pem_pkcs8().unwrap());

        let options = RequestOptions {
            authentication: Authentication::ClientCertificate,
            client_certificate_source: CertificateSource::String,
            client_certificate_in_base64: base64::engine::general_purpose::STANDARD.encode(pem),
            ..Default::default()
        };
        let client = ConfiguredClient::build(&options, &loader()).unwrap();
        assert_eq!(client.certificate_count(), 1);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let options = RequestOptions {
            connection_timeout_seconds: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfiguredClient::build(&options, &loader()),
            Err(RelayError::Validation(_))
        ));
    }
}
