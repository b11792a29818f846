//! Partitioned response cache for offline access.
//!
//! This module defines the `CacheStore` trait along with the types stored in
//! it: an immutable `ResponseSnapshot` of an HTTP response and the
//! `CachedResponse` wrapper that tracks when the snapshot was captured.
//!
//! Two partitions are used by the worker:
//! - the static partition, populated once at install time, never expired by
//!   TTL, replaced wholesale on a version bump;
//! - the dynamic partition, populated lazily as requests are served, with
//!   entries checked against a per-rule max-age at read time.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode cached entry: {0}")]
    Decode(#[from] bincode::Error),

    #[error("could not determine a cache directory")]
    NoCacheDir,
}

/// Byte-for-byte copy of an HTTP response taken at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResponseSnapshot {
    /// True for 2xx statuses. Only successful responses are ever written to
    /// the cache.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A cached response plus the moment it was captured.
///
/// The capture timestamp comes from the response `Date` header. Responses
/// without one are stored, but every expiry check treats them as expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub response: ResponseSnapshot,
    pub captured_at: Option<DateTime<Utc>>,
}

impl CachedResponse {
    /// Wrap a snapshot, deriving the capture timestamp from its `Date`
    /// header when one is present and parseable.
    pub fn new(response: ResponseSnapshot) -> Self {
        let captured_at = response
            .header("date")
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|date| date.with_timezone(&Utc));
        Self {
            response,
            captured_at,
        }
    }

    /// An entry is expired once more than `max_age` has passed since capture.
    /// Entries with no capture timestamp are always expired.
    pub fn is_expired(&self, max_age: std::time::Duration) -> bool {
        let captured_at = match self.captured_at {
            Some(captured_at) => captured_at,
            None => return true,
        };
        match Duration::from_std(max_age) {
            Ok(max_age) => Utc::now() - captured_at > max_age,
            // max_age beyond chrono's range never elapses
            Err(_) => false,
        }
    }
}

/// Storage backend for named cache partitions.
///
/// Keys are fully-qualified request URLs; only GET responses are stored.
/// `put` creates the partition implicitly and always replaces the whole
/// entry. Storage failures propagate to the caller unhandled.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, partition: &str, key: &str) -> Result<Option<CachedResponse>, StoreError>;

    async fn put(
        &self,
        partition: &str,
        key: &str,
        entry: CachedResponse,
    ) -> Result<(), StoreError>;

    /// Delete a partition and every entry in it. Returns whether the
    /// partition existed.
    async fn delete_partition(&self, partition: &str) -> Result<bool, StoreError>;

    async fn list_partitions(&self) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_headers(headers: Vec<(String, String)>) -> ResponseSnapshot {
        ResponseSnapshot {
            status: 200,
            headers,
            body: Bytes::from_static(b"payload"),
        }
    }

    #[test]
    fn test_capture_timestamp_from_date_header() {
        let entry = CachedResponse::new(snapshot_with_headers(vec![(
            "Date".to_string(),
            "Wed, 21 Oct 2015 07:28:00 GMT".to_string(),
        )]));
        let captured_at = entry.captured_at.expect("Date header should be parsed");
        assert_eq!(captured_at.to_rfc2822(), "Wed, 21 Oct 2015 07:28:00 +0000");
    }

    #[test]
    fn test_missing_date_header_is_always_expired() {
        let entry = CachedResponse::new(snapshot_with_headers(vec![]));
        assert!(entry.captured_at.is_none());
        assert!(entry.is_expired(std::time::Duration::from_secs(u64::MAX / 2)));
    }

    #[test]
    fn test_unparseable_date_header_is_always_expired() {
        let entry = CachedResponse::new(snapshot_with_headers(vec![(
            "Date".to_string(),
            "not a date".to_string(),
        )]));
        assert!(entry.is_expired(std::time::Duration::from_secs(3600)));
    }

    #[test]
    fn test_fresh_entry_is_not_expired() {
        let mut entry = CachedResponse::new(snapshot_with_headers(vec![]));
        entry.captured_at = Some(Utc::now());
        assert!(!entry.is_expired(std::time::Duration::from_secs(60)));
    }

    #[test]
    fn test_entry_expires_after_max_age() {
        let mut entry = CachedResponse::new(snapshot_with_headers(vec![]));
        entry.captured_at = Some(Utc::now() - Duration::minutes(61));
        assert!(entry.is_expired(std::time::Duration::from_secs(60 * 60)));
        assert!(!entry.is_expired(std::time::Duration::from_secs(62 * 60)));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let snapshot = snapshot_with_headers(vec![(
            "Content-Type".to_string(),
            "text/html".to_string(),
        )]);
        assert_eq!(snapshot.header("content-type"), Some("text/html"));
        assert_eq!(snapshot.header("CONTENT-TYPE"), Some("text/html"));
        assert_eq!(snapshot.header("etag"), None);
    }

    #[test]
    fn test_success_statuses() {
        let mut snapshot = snapshot_with_headers(vec![]);
        assert!(snapshot.is_success());
        snapshot.status = 204;
        assert!(snapshot.is_success());
        snapshot.status = 304;
        assert!(!snapshot.is_success());
        snapshot.status = 404;
        assert!(!snapshot.is_success());
    }
}
