//! chartcache - offline cache engine for the ViewMarket trading-charts
//! web client.
//!
//! The hosting shell intercepts page requests and hands them to a [`Worker`],
//! which serves them from versioned cache partitions or the network
//! according to an ordered, per-URL strategy table: cache-first for images,
//! network-first for API calls and pages, stale-while-revalidate for static
//! assets. Install-time assets live in a static partition that survives
//! until the version identifiers are bumped; everything else is cached
//! lazily with TTL-based expiry.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chartcache::{HttpFetcher, MemoryStore, Request, Worker, WorkerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let fetcher = Arc::new(HttpFetcher::new()?);
//! let mut worker = Worker::new(WorkerConfig::default(), store, fetcher)?;
//!
//! worker.install().await?;
//! worker.activate().await?;
//!
//! let request = Request::get("https://viewmarket.app/api/prices".parse()?);
//! let _response = worker.handle_fetch(&request).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod fetch;
pub mod store;
pub mod strategy;
pub mod worker;

pub use config::{CacheVersions, ConfigError, WorkerConfig};
pub use executor::{Dispatcher, ServeError};
pub use fetch::{FetchError, HttpFetcher, NetworkFetch};
pub use store::{
    CacheStore, CachedResponse, FileStore, MemoryStore, ResponseSnapshot, StoreError,
};
pub use strategy::{Decision, RuleSpec, Selector, StrategyKind};
pub use worker::{
    ClientCommand, FetchOutcome, InstallError, Notification, NotificationAction, PushError,
    PushPayload, Request, Worker, WorkerError, WorkerState,
};
