// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound request pipeline
//!
//! options → client cache → header/content resolution → executor → envelope

pub mod cache;
pub mod certs;
pub mod client;
pub mod error;
pub mod executor;
pub mod headers;
pub mod options;
pub mod response;

pub use cache::ClientCache;
pub use client::ConfiguredClient;
pub use error::{RelayError, Result};
pub use options::{Authentication, CertificateSource, Header, Method, RequestOptions};
pub use response::{HttpByteResponse, HttpResponse};

use executor::UpstreamResponse;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

/// Executes [`RequestOptions`] against downstream servers.
pub struct Relay {
    cache: ClientCache,
}

impl Relay {
    pub fn new(cache: ClientCache) -> Self {
        Self { cache }
    }

    pub async fn send_text(
        &self,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        self.dispatch(options, cancel)
            .await?
            .into_text_response(options.throw_exception_on_error_response)
    }

    pub async fn send_bytes(
        &self,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<HttpByteResponse> {
        self.dispatch(options, cancel)
            .await?
            .into_byte_response(options.throw_exception_on_error_response)
    }

    pub fn clear_client_cache(&self) -> usize {
        self.cache.clear()
    }

    async fn dispatch(
        &self,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        let span = info_span!(
            "relay",
            request_id = %uuid::Uuid::new_v4(),
            method = %options.method,
            url = %options.url,
        );

        self.run(options, cancel).instrument(span).await
    }

    async fn run(
        &self,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        let client = self.cache.get(options)?;
        let headers = headers::resolve_headers(&options.headers, options);
        let content = headers::resolve_content(Some(&options.message), &headers)?;

        let response = executor::execute(
            &client,
            options.method,
            &options.url,
            content,
            &headers,
            options,
            cancel,
        )
        .await?;

        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }

        tracing::debug!(status = response.status, "downstream responded");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use crate::http::certs::testutil::{make_cert, spawn_tls_server};
    use crate::http::certs::{CertificateLoader, CertificateStore, ClientCertificate};

    fn relay() -> Relay {
        let store = CertificateStore::open("/nonexistent/store");
        Relay::new(ClientCache::new(
            CertificateLoader::new(store),
            cache::DEFAULT_IDLE_TTL,
        ))
    }

    #[tokio::test]
    async fn test_self_signed_downstream_accepted_by_default() {
        let url = spawn_tls_server();
        let options = RequestOptions {
            url,
            ..Default::default()
        };

        let response = relay()
            .send_text(&options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body.as_deref(), Some("anonymous"));
    }

    #[tokio::test]
    async fn test_self_signed_downstream_rejected_when_validating() {
        let url = spawn_tls_server();
        let options = RequestOptions {
            url,
            allow_invalid_certificate: false,
            ..Default::default()
        };

        let err = relay()
            .send_text(&options, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Timeout));
    }

    #[tokio::test]
    async fn test_client_certificate_is_presented() {
        let url = spawn_tls_server();
        let (cert, key) = make_cert("relay client", None);
        let expected = ClientCertificate::new(cert.clone(), None).unwrap();
        let mut pem = cert.to_pem().unwrap();
        pem.extend_from_slice(&key.private_key_to_pem_pkcs8().unwrap());

        let options = RequestOptions {
            url,
            authentication: Authentication::ClientCertificate,
            client_certificate_source: CertificateSource::String,
            client_certificate_in_base64: base64::engine::general_purpose::STANDARD.encode(pem),
            ..Default::default()
        };

        let response = relay()
            .send_text(&options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.body.as_deref(), Some(expected.thumbprint()));
    }
}
