//! Worker lifecycle and request interception.
//!
//! The `Worker` is the engine the hosting shell drives: `install` populates
//! the static partition from the asset manifest, `activate` sweeps partitions
//! left over from previous versions, and `handle_fetch` routes every
//! intercepted GET through the strategy selector to an executor. The push,
//! notification-click, and sync hooks live here too, since the host
//! dispatches them to the same component.
//!
//! All state lives in the injected `CacheStore`; the worker itself only
//! tracks its lifecycle phase.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WorkerConfig;
use crate::executor::{Dispatcher, ServeError};
use crate::fetch::{FetchError, NetworkFetch};
use crate::store::{CacheStore, CachedResponse, ResponseSnapshot, StoreError};
use crate::strategy::Selector;

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("invalid origin `{origin}`: {source}")]
    Origin {
        origin: String,
        source: url::ParseError,
    },

    #[error("invalid pattern in strategy rule table: {0}")]
    Rules(#[from] regex::Error),
}

/// A failed install leaves nothing behind; the host retries the whole
/// install on a later load.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("invalid pre-cache path `{path}`: {source}")]
    Path {
        path: String,
        source: url::ParseError,
    },

    #[error("failed to pre-cache {url}: {source}")]
    Fetch { url: String, source: FetchError },

    #[error("pre-cache fetch for {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to write static cache: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("malformed push payload: {0}")]
    Payload(#[from] serde_json::Error),
}

// ============================================================================
// Requests and outcomes
// ============================================================================

/// An intercepted request: method plus fully-qualified URL.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    url: Url,
}

impl Request {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// What interception decided for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The request is not ours to answer; the host forwards it untouched.
    PassThrough,
    /// The response to hand back to the page.
    Response(ResponseSnapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Waiting,
    Activating,
    Active,
}

// ============================================================================
// Push notifications
// ============================================================================

/// Notification action identifier that opens the app.
pub const ACTION_EXPLORE: &str = "explore";

/// Notification action identifier that dismisses the notification.
pub const ACTION_CLOSE: &str = "close";

/// Payload contract for pushed messages.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(rename = "primaryKey")]
    pub primary_key: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Platform notification built from a push payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: Option<String>,
    pub actions: Vec<NotificationAction>,
}

/// Instruction handed back to the host after a notification interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    OpenWindow(String),
}

// ============================================================================
// Worker
// ============================================================================

pub struct Worker {
    config: WorkerConfig,
    origin: Url,
    selector: Selector,
    dispatcher: Dispatcher,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn NetworkFetch>,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn NetworkFetch>,
    ) -> Result<Self, WorkerError> {
        let origin = Url::parse(&config.origin).map_err(|source| WorkerError::Origin {
            origin: config.origin.clone(),
            source,
        })?;
        let selector = Selector::from_specs(&config.rules)?;
        let dispatcher = Dispatcher::new(Arc::clone(&store), Arc::clone(&fetcher));
        Ok(Self {
            config,
            origin,
            selector,
            dispatcher,
            store,
            fetcher,
            state: WorkerState::Installing,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Pre-fetch the asset manifest into the static partition.
    ///
    /// Every asset must come back 2xx before anything is written; a single
    /// failure aborts the install with the cache untouched.
    pub async fn install(&mut self) -> Result<(), InstallError> {
        self.state = WorkerState::Installing;
        info!(assets = self.config.precache.len(), "installing static cache");

        let mut targets = Vec::with_capacity(self.config.precache.len());
        for path in &self.config.precache {
            let url = self
                .origin
                .join(path)
                .map_err(|source| InstallError::Path {
                    path: path.clone(),
                    source,
                })?;
            targets.push(url);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let mut fetches = stream::iter(targets)
            .map(|url| {
                let fetcher = Arc::clone(&fetcher);
                async move {
                    let result = fetcher.fetch(&url).await;
                    (url, result)
                }
            })
            .buffer_unordered(self.config.precache_concurrency.max(1));

        let mut entries = Vec::with_capacity(self.config.precache.len());
        while let Some((url, result)) = fetches.next().await {
            match result {
                Ok(snapshot) if snapshot.is_success() => {
                    entries.push((url.to_string(), CachedResponse::new(snapshot)));
                }
                Ok(snapshot) => {
                    return Err(InstallError::Status {
                        url: url.to_string(),
                        status: snapshot.status,
                    });
                }
                Err(source) => {
                    return Err(InstallError::Fetch {
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
        drop(fetches);

        let partition = &self.config.versions.static_partition;
        for (key, entry) in entries {
            self.store.put(partition, &key, entry).await?;
        }

        // skip the waiting phase so the new version takes over immediately
        self.state = WorkerState::Waiting;
        info!(partition = %partition, "static cache installed, skipping waiting phase");
        Ok(())
    }

    /// Delete every partition not named by the current version identifiers,
    /// then take control of open pages.
    pub async fn activate(&mut self) -> Result<(), StoreError> {
        self.state = WorkerState::Activating;
        let retained = self.config.versions.retained();

        for name in self.store.list_partitions().await? {
            if !retained.contains(&name.as_str()) {
                self.store.delete_partition(&name).await?;
                info!(partition = %name, "deleted stale cache partition");
            }
        }

        self.state = WorkerState::Active;
        info!("worker active, claiming clients");
        Ok(())
    }

    /// Route one intercepted request.
    ///
    /// Non-GET requests and non-http(s) schemes pass through untouched.
    /// Install-time assets are served from the static partition without an
    /// expiry check; everything else goes through strategy selection against
    /// the dynamic partition.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, ServeError> {
        if !request.is_get() {
            return Ok(FetchOutcome::PassThrough);
        }
        if !matches!(request.url.scheme(), "http" | "https") {
            return Ok(FetchOutcome::PassThrough);
        }

        let key = request.url.as_str();
        let static_partition = &self.config.versions.static_partition;
        if let Some(entry) = self.store.get(static_partition, key).await? {
            debug!(url = %request.url, "serving install-time asset");
            return Ok(FetchOutcome::Response(entry.response));
        }

        let decision = self.selector.select(&request.url);
        debug!(
            url = %request.url,
            rule = %decision.rule,
            strategy = ?decision.strategy,
            "dispatching intercepted fetch"
        );
        let response = self
            .dispatcher
            .dispatch(
                decision.strategy,
                &request.url,
                &self.config.versions.dynamic_partition,
                decision.max_age,
            )
            .await?;
        Ok(FetchOutcome::Response(response))
    }

    /// Background-sync hook. Registered so the host keeps dispatching sync
    /// events; there is no queued work to replay yet.
    pub fn handle_sync(&self, tag: &str) {
        debug!(tag, "sync event received, nothing queued");
    }

    /// Build the platform notification for a pushed payload.
    pub fn handle_push(&self, payload: &str) -> Result<Notification, PushError> {
        let payload: PushPayload = serde_json::from_str(payload)?;
        let tag = payload.primary_key.map(|key| match key {
            serde_json::Value::String(tag) => tag,
            other => other.to_string(),
        });
        Ok(Notification {
            title: payload.title,
            body: payload.body,
            tag,
            actions: vec![
                NotificationAction {
                    action: ACTION_EXPLORE.to_string(),
                    title: "View charts".to_string(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_string(),
                    title: "Close".to_string(),
                },
            ],
        })
    }

    /// React to a notification interaction. Only the explore action opens a
    /// window; close and unknown actions just dismiss.
    pub fn handle_notification_click(&self, action: &str) -> Option<ClientCommand> {
        if action == ACTION_EXPLORE {
            Some(ClientCommand::OpenWindow("/".to_string()))
        } else {
            warn!(action, "unhandled notification action");
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
