//! Serving strategies for intercepted requests.
//!
//! Each executor runs one request to completion against a cache partition
//! and the network:
//!
//! - cache-first: fresh cache hit wins; otherwise fetch and store. On a
//!   transport failure any cached entry, however stale, beats giving up;
//!   with nothing cached a synthetic 408 is served.
//! - network-first: the network wins; a non-expired cache entry is the only
//!   fallback, and with none the failure propagates to the caller.
//! - stale-while-revalidate: serve whatever is cached and refresh it in the
//!   background; a miss awaits the network directly.
//!
//! Successful (2xx) GET responses are written back to the partition the
//! executor was handed; everything else is served without being stored.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::fetch::{FetchError, NetworkFetch};
use crate::store::{CacheStore, CachedResponse, ResponseSnapshot, StoreError};
use crate::strategy::StrategyKind;

/// Status of the synthetic response served when cache-first has neither a
/// cached entry nor a network.
const NETWORK_ERROR_STATUS: u16 = 408;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("cache store failure: {0}")]
    Store(#[from] StoreError),

    #[error("network failure with no cached fallback: {0}")]
    Network(#[from] FetchError),
}

/// Placeholder response for a cache-first request that cannot be satisfied
/// at all.
pub(crate) fn network_error_response() -> ResponseSnapshot {
    ResponseSnapshot {
        status: NETWORK_ERROR_STATUS,
        headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
        body: Bytes::from_static(b"Network error"),
    }
}

/// Runs strategy executors against an injected store and fetcher.
pub struct Dispatcher {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn NetworkFetch>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn NetworkFetch>) -> Self {
        Self { store, fetcher }
    }

    pub async fn dispatch(
        &self,
        strategy: StrategyKind,
        url: &Url,
        partition: &str,
        max_age: Duration,
    ) -> Result<ResponseSnapshot, ServeError> {
        match strategy {
            StrategyKind::CacheFirst => self.cache_first(url, partition, max_age).await,
            StrategyKind::NetworkFirst => self.network_first(url, partition, max_age).await,
            StrategyKind::StaleWhileRevalidate => {
                self.stale_while_revalidate(url, partition).await
            }
        }
    }

    async fn cache_first(
        &self,
        url: &Url,
        partition: &str,
        max_age: Duration,
    ) -> Result<ResponseSnapshot, ServeError> {
        let cached = self.store.get(partition, url.as_str()).await?;
        if let Some(entry) = &cached {
            if !entry.is_expired(max_age) {
                return Ok(entry.response.clone());
            }
        }

        match self.fetch_and_store(url, partition).await {
            Ok(response) => Ok(response),
            Err(err) => match cached {
                // a stale entry still beats failing the request
                Some(entry) => {
                    debug!(url = %url, error = %err, "network failed, serving stale entry");
                    Ok(entry.response)
                }
                None => {
                    warn!(url = %url, error = %err, "network failed with empty cache");
                    Ok(network_error_response())
                }
            },
        }
    }

    async fn network_first(
        &self,
        url: &Url,
        partition: &str,
        max_age: Duration,
    ) -> Result<ResponseSnapshot, ServeError> {
        match self.fetch_and_store(url, partition).await {
            Ok(response) => Ok(response),
            Err(err) => match self.store.get(partition, url.as_str()).await? {
                Some(entry) if !entry.is_expired(max_age) => {
                    debug!(url = %url, error = %err, "network failed, serving cached entry");
                    Ok(entry.response)
                }
                _ => Err(ServeError::Network(err)),
            },
        }
    }

    async fn stale_while_revalidate(
        &self,
        url: &Url,
        partition: &str,
    ) -> Result<ResponseSnapshot, ServeError> {
        match self.store.get(partition, url.as_str()).await? {
            Some(entry) => {
                let _ = self.spawn_revalidation(url, partition);
                Ok(entry.response)
            }
            None => Ok(self.fetch_and_store(url, partition).await?),
        }
    }

    /// Fetch `url` and, when the response is 2xx, overwrite the cache entry.
    async fn fetch_and_store(
        &self,
        url: &Url,
        partition: &str,
    ) -> Result<ResponseSnapshot, FetchError> {
        let response = self.fetcher.fetch(url).await?;
        if response.is_success() {
            let entry = CachedResponse::new(response.clone());
            if let Err(err) = self.store.put(partition, url.as_str(), entry).await {
                // serving still succeeds; only the write-back is lost
                warn!(url = %url, error = %err, "failed to store fetched response");
            }
        }
        Ok(response)
    }

    /// Fire-and-forget refresh of a cached entry. The caller never waits on
    /// the result; failures are logged and the stale entry stays in place.
    fn spawn_revalidation(&self, url: &Url, partition: &str) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let url = url.clone();
        let partition = partition.to_string();
        tokio::spawn(async move {
            match fetcher.fetch(&url).await {
                Ok(response) if response.is_success() => {
                    let entry = CachedResponse::new(response);
                    if let Err(err) = store.put(&partition, url.as_str(), entry).await {
                        warn!(url = %url, error = %err, "failed to store revalidated response");
                    }
                }
                Ok(response) => {
                    debug!(url = %url, status = response.status, "revalidation not stored");
                }
                Err(err) => {
                    debug!(url = %url, error = %err, "revalidation fetch failed");
                }
            }
        })
    }
}
