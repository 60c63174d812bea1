// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client certificate loading
//!
//! Certificates come from one of three places: the personal certificate
//! store, a file on disk, or a base64 string. All of them end up in the
//! same importer, which understands PKCS#12, PEM and plain DER.

use super::error::{RelayError, Result};
use super::options::{CertificateSource, RequestOptions};
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509, X509VerifyResult};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_CHAIN_DEPTH: usize = 10;

/// A certificate plus its private key, when the source carried one.
#[derive(Clone)]
pub struct ClientCertificate {
    cert: X509,
    key: Option<PKey<Private>>,
    thumbprint: String,
}

impl ClientCertificate {
    pub fn new(cert: X509, key: Option<PKey<Private>>) -> Result<Self> {
        let digest = cert.digest(MessageDigest::sha1())?;
        let thumbprint = digest.iter().map(|b| format!("{:02X}", b)).collect();
        Ok(Self {
            cert,
            key,
            thumbprint,
        })
    }

    pub fn certificate(&self) -> &X509 {
        &self.cert
    }

    pub fn private_key(&self) -> Option<&PKey<Private>> {
        self.key.as_ref()
    }

    pub fn has_private_key(&self) -> bool {
        self.key.is_some()
    }

    /// Uppercase hex SHA-1 of the DER encoding.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    fn is_self_issued(&self) -> bool {
        self.cert.issued(&self.cert) == X509VerifyResult::OK
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("thumbprint", &self.thumbprint)
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}

/// Personal certificate store backed by a directory of certificate files.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    dir: PathBuf,
}

impl CertificateStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<home>/.relayx/certs/my`
    pub fn default_location() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".relayx").join("certs").join("my"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every certificate in the store. A missing directory is an empty store.
    pub fn certificates(&self) -> Result<Vec<ClientCertificate>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RelayError::Certificate(format!(
                    "Failed to open certificate store {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut certificates = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let loaded = fs::read(&path)
                .map_err(|e| RelayError::Certificate(e.to_string()))
                .and_then(|bytes| import_certificates(&bytes, ""));
            match loaded {
                Ok(mut found) => certificates.append(&mut found),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping store entry"),
            }
        }

        Ok(certificates)
    }
}

/// Resolves client certificates for [`RequestOptions`].
#[derive(Debug, Clone)]
pub struct CertificateLoader {
    store: CertificateStore,
}

impl CertificateLoader {
    pub fn new(store: CertificateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    /// Load the certificates the options point at, private-key holders first.
    pub fn load(&self, options: &RequestOptions) -> Result<Vec<ClientCertificate>> {
        match options.client_certificate_source {
            CertificateSource::CertificateStore => self.from_store(
                &options.certificate_thumbprint,
                options.load_entire_chain_for_certificate,
            ),
            CertificateSource::File => from_file(
                Path::new(&options.client_certificate_file_path),
                &options.client_certificate_key_phrase,
            ),
            CertificateSource::String => from_base64(
                &options.client_certificate_in_base64,
                &options.client_certificate_key_phrase,
            ),
        }
    }

    pub fn from_store(&self, thumbprint: &str, load_entire_chain: bool) -> Result<Vec<ClientCertificate>> {
        let thumbprint = normalize_thumbprint(thumbprint);
        let pool = self.store.certificates()?;

        let certificate = pool
            .iter()
            .filter(|c| c.thumbprint() == thumbprint)
            .max_by_key(|c| c.has_private_key())
            .cloned()
            .ok_or_else(|| {
                RelayError::NotFound(format!(
                    "Certificate with thumbprint: '{}' not found in current user cert store.",
                    thumbprint
                ))
            })?;

        if !load_entire_chain {
            return Ok(vec![certificate]);
        }

        let mut chain = build_chain(certificate, &pool);
        sort_private_key_first(&mut chain);
        Ok(chain)
    }
}

/// Strip everything but ASCII letters and digits, then uppercase.
pub fn normalize_thumbprint(thumbprint: &str) -> String {
    thumbprint
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn from_file(path: &Path, key_phrase: &str) -> Result<Vec<ClientCertificate>> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            RelayError::NotFound(format!("Could not find file '{}'.", path.display()))
        }
        _ => RelayError::Certificate(format!("Failed to read {}: {}", path.display(), e)),
    })?;
    import_certificates(&bytes, key_phrase)
}

pub fn from_base64(contents: &str, key_phrase: &str) -> Result<Vec<ClientCertificate>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(contents.trim())
        .map_err(|e| RelayError::Validation(format!("The input is not a valid Base-64 string: {}", e)))?;
    import_certificates(&bytes, key_phrase)
}

/// Import a certificate collection. An empty key phrase imports without one.
pub fn import_certificates(bytes: &[u8], key_phrase: &str) -> Result<Vec<ClientCertificate>> {
    let mut certificates = if looks_like_pem(bytes) {
        from_pem(bytes, key_phrase)?
    } else if let Ok(pkcs12) = Pkcs12::from_der(bytes) {
        from_pkcs12(&pkcs12, key_phrase)?
    } else {
        vec![ClientCertificate::new(X509::from_der(bytes)?, None)?]
    };

    if certificates.is_empty() {
        return Err(RelayError::Certificate("No certificates found".to_string()));
    }

    sort_private_key_first(&mut certificates);
    Ok(certificates)
}

fn from_pkcs12(pkcs12: &Pkcs12, key_phrase: &str) -> Result<Vec<ClientCertificate>> {
    let parsed = pkcs12.parse2(key_phrase)?;

    let mut certificates = Vec::new();
    if let Some(cert) = parsed.cert {
        certificates.push(ClientCertificate::new(cert, parsed.pkey)?);
    }
    if let Some(ca) = parsed.ca {
        for cert in ca {
            certificates.push(ClientCertificate::new(cert, None)?);
        }
    }
    Ok(certificates)
}

fn from_pem(bytes: &[u8], key_phrase: &str) -> Result<Vec<ClientCertificate>> {
    let certs = X509::stack_from_pem(bytes)?;

    let mut key = if !contains(bytes, b"PRIVATE KEY-----") {
        None
    } else if key_phrase.is_empty() {
        Some(PKey::private_key_from_pem(bytes)?)
    } else {
        Some(PKey::private_key_from_pem_passphrase(bytes, key_phrase.as_bytes())?)
    };

    certs
        .into_iter()
        .map(|cert| {
            let matches = match (&key, cert.public_key()) {
                (Some(k), Ok(public)) => public.public_eq(k),
                _ => false,
            };
            let own_key = if matches { key.take() } else { None };
            ClientCertificate::new(cert, own_key)
        })
        .collect()
}

fn build_chain(leaf: ClientCertificate, pool: &[ClientCertificate]) -> Vec<ClientCertificate> {
    let mut chain = vec![leaf];

    while chain.len() < MAX_CHAIN_DEPTH {
        let current = &chain[chain.len() - 1];
        if current.is_self_issued() {
            break;
        }
        let issuer = pool.iter().find(|candidate| {
            candidate.cert.issued(&current.cert) == X509VerifyResult::OK
                && !chain.iter().any(|c| c.thumbprint() == candidate.thumbprint())
        });
        match issuer {
            Some(issuer) => chain.push(issuer.clone()),
            None => break,
        }
    }

    chain
}

fn sort_private_key_first(certificates: &mut [ClientCertificate]) {
    certificates.sort_by_key(|c| !c.has_private_key());
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    contains(bytes, b"-----BEGIN ")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Build a TLS client identity: the first keyed certificate plus the rest as chain.
pub fn identity(certificates: &[ClientCertificate]) -> Result<reqwest::Identity> {
    let leaf = certificates
        .iter()
        .find(|c| c.has_private_key())
        .ok_or_else(|| {
            RelayError::Certificate("No certificate with a private key was found".to_string())
        })?;

    let mut pem = Vec::new();
    if let Some(key) = leaf.private_key() {
        pem.extend_from_slice(&key.private_key_to_pem_pkcs8()?);
    }
    pem.extend_from_slice(&leaf.cert.to_pem()?);
    for other in certificates.iter().filter(|c| c.thumbprint() != leaf.thumbprint()) {
        pem.extend_from_slice(&other.cert.to_pem()?);
    }

    reqwest::Identity::from_pem(&pem).map_err(|e| RelayError::Certificate(e.to_string()))
}
