//! Network side of the cache: the `NetworkFetch` trait and its reqwest
//! implementation.
//!
//! A fetch returns a `ResponseSnapshot` for any HTTP status; a 404 is a
//! response, not an error. `FetchError` covers transport failures only.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::store::ResponseSnapshot;

/// HTTP request timeout in seconds. There is no per-strategy timeout on top
/// of this; a hung request holds up only its own resolution.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Transport failure reported by a non-reqwest `NetworkFetch`
    /// implementation.
    #[error("fetch failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait NetworkFetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<ResponseSnapshot, FetchError>;
}

/// reqwest-backed fetcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkFetch for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<ResponseSnapshot, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        // non-UTF-8 header values cannot be replayed through the snapshot;
        // skip them rather than failing the whole response
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?;
        Ok(ResponseSnapshot {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fetcher for executor and worker tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use url::Url;

    use super::{FetchError, NetworkFetch};
    use crate::store::ResponseSnapshot;

    /// Route test logs through the capture writer; `RUST_LOG` controls the
    /// level as usual.
    pub(crate) fn init_tracing() {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }

    pub(crate) fn snapshot(status: u16, body: &str) -> ResponseSnapshot {
        ResponseSnapshot {
            status,
            headers: vec![(
                "Date".to_string(),
                chrono::Utc::now().to_rfc2822(),
            )],
            body: Bytes::from(body.to_string()),
        }
    }

    enum Script {
        Always(ResponseSnapshot),
        Fail(String),
        Queue(Mutex<VecDeque<Result<ResponseSnapshot, String>>>),
    }

    pub(crate) struct ScriptedFetch {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedFetch {
        /// Answers every fetch with the same snapshot.
        pub(crate) fn always(snapshot: ResponseSnapshot) -> Self {
            Self {
                script: Script::Always(snapshot),
                calls: AtomicUsize::new(0),
            }
        }

        /// Fails every fetch with the given transport error.
        pub(crate) fn failing(reason: &str) -> Self {
            Self {
                script: Script::Fail(reason.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        /// Answers fetches in order from a queue; errors once exhausted.
        pub(crate) fn queue(responses: Vec<Result<ResponseSnapshot, String>>) -> Self {
            Self {
                script: Script::Queue(Mutex::new(responses.into_iter().collect())),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NetworkFetch for ScriptedFetch {
        async fn fetch(&self, _url: &Url) -> Result<ResponseSnapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Always(snapshot) => Ok(snapshot.clone()),
                Script::Fail(reason) => Err(FetchError::Failed(reason.clone())),
                Script::Queue(queue) => match queue.lock().unwrap().pop_front() {
                    Some(Ok(snapshot)) => Ok(snapshot),
                    Some(Err(reason)) => Err(FetchError::Failed(reason)),
                    None => Err(FetchError::Failed("unscripted fetch".to_string())),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CachedResponse;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    #[tokio::test]
    async fn test_fetch_captures_status_headers_and_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/prices");
            then.status(200)
                .header("Content-Type", "application/json")
                .header("Date", "Wed, 21 Oct 2015 07:28:00 GMT")
                .body(r#"{"ACME":42.0}"#);
        });

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&server.url("/api/prices")).unwrap();
        let snapshot = fetcher.fetch(&url).await.unwrap();

        assert_eq!(snapshot.status, 200);
        assert_eq!(snapshot.header("content-type"), Some("application/json"));
        assert_eq!(snapshot.body.as_ref(), br#"{"ACME":42.0}"#);

        let entry = CachedResponse::new(snapshot);
        let captured_at = entry.captured_at.expect("Date header should be captured");
        assert_eq!(captured_at.to_rfc2822(), "Wed, 21 Oct 2015 07:28:00 +0000");
    }

    #[tokio::test]
    async fn test_fetch_returns_snapshot_for_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("not here");
        });

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&server.url("/missing")).unwrap();
        let snapshot = fetcher.fetch(&url).await.unwrap();

        assert_eq!(snapshot.status, 404);
        assert!(!snapshot.is_success());
        assert_eq!(snapshot.body.as_ref(), b"not here");
    }
}
