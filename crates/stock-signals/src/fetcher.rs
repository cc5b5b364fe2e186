//! Fetch gateway: cache first, then throttle, then network

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::{DEFAULT_TTL, FetchCache};
use crate::error::{FetchError, StoreError};
use crate::rate_limit::Throttle;

/// Shared entry point for every outbound data fetch
///
/// A cache hit returns before the throttle is consulted, so repeated analyses
/// of the same ticker cost no external requests while entries are fresh.
#[derive(Clone)]
pub struct Fetcher {
    cache: Arc<dyn FetchCache>,
    throttle: Arc<dyn Throttle>,
    http: Client,
    default_ttl: Duration,
    ttl_overrides: HashMap<String, Duration>,
}

impl Fetcher {
    pub fn new(cache: Arc<dyn FetchCache>, throttle: Arc<dyn Throttle>, http: Client) -> Self {
        Self {
            cache,
            throttle,
            http,
            default_ttl: DEFAULT_TTL,
            ttl_overrides: HashMap::new(),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Cache lifetime for one source, keyed by source name
    pub fn with_ttl_override(mut self, source: impl Into<String>, ttl: Duration) -> Self {
        self.ttl_overrides.insert(source.into(), ttl);
        self
    }

    pub fn with_ttl_overrides(mut self, overrides: HashMap<String, Duration>) -> Self {
        self.ttl_overrides.extend(overrides);
        self
    }

    /// Lifetime to use for entries written on behalf of `source`
    pub fn ttl_for(&self, source: &str) -> Duration {
        self.ttl_overrides.get(source).copied().unwrap_or(self.default_ttl)
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Return the cached content for `key`, or fetch, store and return it
    ///
    /// Failed fetches are not cached. A cache that cannot be read is treated
    /// as a miss and a cache that cannot be written only costs a warning.
    pub async fn cached<F, Fut>(&self, key: &str, domain: &str, ttl: Duration, fetch: F) -> Result<String, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, FetchError>>,
    {
        match self.cache.get(key).await {
            Ok(Some(content)) => {
                debug!(key, "Cache hit");
                return Ok(content);
            }
            Ok(None) => debug!(key, "Cache miss"),
            Err(e) => warn!(key, error = %e, "Cache read failed, fetching"),
        }

        let permit = self.throttle.acquire(domain).await;
        debug!(key, domain = permit.domain(), "Fetching");
        let content = fetch().await?;

        if let Err(e) = self.cache.put(key, &content, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
        Ok(content)
    }

    /// GET `url` as text, cached under the URL itself
    pub async fn get_text(&self, url: &str, ttl: Duration) -> Result<String, FetchError> {
        self.get_text_as(url, url, ttl).await
    }

    /// GET `url` as text, cached under `key`
    ///
    /// Use this when the URL carries credentials that must not end up in the
    /// cache table.
    pub async fn get_text_as(&self, key: &str, url: &str, ttl: Duration) -> Result<String, FetchError> {
        let domain = domain_of(url)?;
        let http = self.http.clone();
        self.cached(key, &domain, ttl, || async move {
            let response = http.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    source_name: domain_of(url).unwrap_or_default(),
                    status: status.as_u16(),
                });
            }
            Ok(response.text().await?)
        })
        .await
    }

    /// GET `url` and decode the cached body as JSON
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str, url: &str, ttl: Duration) -> Result<T, FetchError> {
        let body = self.get_text_as(key, url, ttl).await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.cache.purge_expired().await
    }
}

/// Host part of a URL, used as the throttle key
pub fn domain_of(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))
}
