// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configured-client cache with sliding expiration

use super::certs::CertificateLoader;
use super::client::ConfiguredClient;
use super::error::Result;
use super::options::RequestOptions;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Evict a client after seven days without access.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Key/value storage with idle-based eviction.
pub trait ClientStore<T>: Send + Sync {
    fn get(&self, key: &str) -> Option<T>;

    /// Store `value`; it expires once it has gone unread for `idle_ttl`.
    fn set(&self, key: String, value: T, idle_ttl: Duration);

    /// Drop expired entries, then the least recently used `percentage`
    /// (0.0..=1.0) of what is left. Returns how many entries were removed.
    fn compact(&self, percentage: f64) -> usize;
}

struct IdleEntry<T> {
    value: T,
    idle_ttl: Duration,
    last_access: Instant,
}

impl<T> IdleEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_access) >= self.idle_ttl
    }
}

/// Concurrent in-memory [`ClientStore`].
pub struct IdleCache<T> {
    entries: DashMap<String, IdleEntry<T>>,
}

impl<T> IdleCache<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

impl<T> Default for IdleCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> ClientStore<T> for IdleCache<T> {
    fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        {
            let mut entry = self.entries.get_mut(key)?;
            if !entry.is_expired(now) {
                entry.last_access = now;
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    fn set(&self, key: String, value: T, idle_ttl: Duration) {
        let now = Instant::now();
        self.purge_expired(now);
        self.entries.insert(
            key,
            IdleEntry {
                value,
                idle_ttl,
                last_access: now,
            },
        );
    }

    fn compact(&self, percentage: f64) -> usize {
        let mut removed = self.purge_expired(Instant::now());

        let mut by_access: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_access))
            .collect();
        by_access.sort_by_key(|(_, last_access)| *last_access);

        let count = (by_access.len() as f64 * percentage.clamp(0.0, 1.0)).ceil() as usize;
        for (key, _) in by_access.into_iter().take(count) {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }

        removed
    }
}

/// Memoizes [`ConfiguredClient`]s by their client-level options.
pub struct ClientCache {
    store: Arc<dyn ClientStore<Arc<ConfiguredClient>>>,
    loader: CertificateLoader,
    idle_ttl: Duration,
}

impl ClientCache {
    pub fn new(loader: CertificateLoader, idle_ttl: Duration) -> Self {
        Self::with_store(Arc::new(IdleCache::new()), loader, idle_ttl)
    }

    pub fn with_store(
        store: Arc<dyn ClientStore<Arc<ConfiguredClient>>>,
        loader: CertificateLoader,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            store,
            loader,
            idle_ttl,
        }
    }

    pub fn get(&self, options: &RequestOptions) -> Result<Arc<ConfiguredClient>> {
        let key = cache_key(options);

        if let Some(client) = self.store.get(&key) {
            debug!("client cache hit");
            return Ok(client);
        }

        debug!("client cache miss");
        let client = Arc::new(ConfiguredClient::build(options, &self.loader)?);
        self.store.set(key, Arc::clone(&client), self.idle_ttl);
        Ok(client)
    }

    /// Evict every cached client.
    pub fn clear(&self) -> usize {
        self.store.compact(1.0)
    }
}

/// Everything that shapes the client. The bearer token is request scoped
/// and stays out of the key.
pub fn cache_key(options: &RequestOptions) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
        options.authentication,
        options.username,
        options.password,
        options.client_certificate_source,
        options.client_certificate_file_path,
        options.client_certificate_in_base64,
        options.client_certificate_key_phrase,
        options.certificate_thumbprint,
        options.load_entire_chain_for_certificate,
        options.connection_timeout_seconds,
        options.follow_redirects,
        options.allow_invalid_certificate,
        options.allow_invalid_response_content_type_charset,
        options.throw_exception_on_error_response,
        options.automatic_cookie_handling,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::certs::CertificateStore;
    use crate::http::options::{Authentication, CertificateSource};
    use std::thread::sleep;

    fn cache() -> ClientCache {
        ClientCache::new(
            CertificateLoader::new(CertificateStore::open("/nonexistent/store")),
            DEFAULT_IDLE_TTL,
        )
    }

    #[test]
    fn test_token_does_not_fragment_cache() {
        let cache = cache();
        let first = RequestOptions {
            authentication: Authentication::OAuth,
            token: "one".to_string(),
            ..Default::default()
        };
        let second = RequestOptions {
            token: "two".to_string(),
            url: "http://elsewhere".to_string(),
            message: "body".to_string(),
            ..first.clone()
        };

        let a = cache.get(&first).unwrap();
        let b = cache.get(&second).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_client_affecting_fields_get_distinct_clients() {
        let base = RequestOptions::default();
        let variants: Vec<RequestOptions> = vec![
            RequestOptions { authentication: Authentication::Basic, ..base.clone() },
            RequestOptions { username: "u".into(), ..base.clone() },
            RequestOptions { password: "p".into(), ..base.clone() },
            RequestOptions { client_certificate_source: CertificateSource::File, ..base.clone() },
            RequestOptions { client_certificate_file_path: "/c.pfx".into(), ..base.clone() },
            RequestOptions { client_certificate_in_base64: "AAAA".into(), ..base.clone() },
            RequestOptions { client_certificate_key_phrase: "k".into(), ..base.clone() },
            RequestOptions { certificate_thumbprint: "AB".into(), ..base.clone() },
            RequestOptions { load_entire_chain_for_certificate: false, ..base.clone() },
            RequestOptions { connection_timeout_seconds: 5, ..base.clone() },
            RequestOptions { follow_redirects: false, ..base.clone() },
            RequestOptions { allow_invalid_certificate: false, ..base.clone() },
            RequestOptions { allow_invalid_response_content_type_charset: false, ..base.clone() },
            RequestOptions { throw_exception_on_error_response: false, ..base.clone() },
            RequestOptions { automatic_cookie_handling: false, ..base.clone() },
        ];

        let cache = cache();
        let base_client = cache.get(&base).unwrap();
        let mut seen = vec![base_client];
        for options in &variants {
            let client = cache.get(options).unwrap();
            assert!(seen.iter().all(|c| !Arc::ptr_eq(c, &client)));
            seen.push(client);
        }
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let cache = cache();
        let options = RequestOptions {
            authentication: Authentication::WindowsAuthentication,
            username: "nodomain".into(),
            ..Default::default()
        };
        assert!(cache.get(&options).is_err());
        assert!(cache.get(&options).is_err());
    }

    #[test]
    fn test_sliding_expiration() {
        let store = IdleCache::new();
        let ttl = Duration::from_millis(300);
        store.set("k".to_string(), 1, ttl);

        sleep(Duration::from_millis(200));
        assert_eq!(store.get("k"), Some(1));
        sleep(Duration::from_millis(200));
        // 400ms since insert, 200ms since last access
        assert_eq!(store.get("k"), Some(1));
        sleep(Duration::from_millis(400));
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_compact_evicts_least_recently_used() {
        let store = IdleCache::new();
        store.set("old".to_string(), 1, DEFAULT_IDLE_TTL);
        sleep(Duration::from_millis(5));
        store.set("new".to_string(), 2, DEFAULT_IDLE_TTL);

        assert_eq!(store.compact(0.5), 1);
        assert_eq!(store.get("old"), None);
        assert_eq!(store.get("new"), Some(2));

        assert_eq!(store.compact(1.0), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_forces_rebuild() {
        let cache = cache();
        let options = RequestOptions::default();
        let a = cache.get(&options).unwrap();
        assert_eq!(cache.clear(), 1);
        let b = cache.get(&options).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
