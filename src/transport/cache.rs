//! HTTP response cache for GET requests.
//!
//! Entries are keyed by URL plus the request values of the headers the
//! response listed in `Vary`. Freshness comes from `Expires` and
//! `Cache-Control`; stale entries are revalidated with `If-None-Match` and
//! `If-Modified-Since`.
//!
//! The cache is stored as a single JSON document. Bodies are base64 encoded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, CACHE_CONTROL, ETAG, EXPIRES, LAST_MODIFIED, PRAGMA, VARY};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::error::{HyperApiError, Result};

/// Oldest server version whose responses the cache understands.
pub const MINIMUM_VERSION: &str = "2.0.14";

/// Version of the on-disk format. Files with any other version are discarded.
pub const SCHEMA_VERSION: u32 = 2;

/// One cached response.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    /// Request header values the response varied on (lowercase names).
    pub vary_headers: BTreeMap<String, Option<String>>,
    pub max_age: Option<u64>,
    pub etag: Option<String>,
    pub local_date: DateTime<Utc>,
    pub last_modified: Option<String>,
    pub mime_type: Option<String>,
    pub item_mime_type: Option<String>,
    #[serde_as(as = "Base64")]
    pub response_body: Vec<u8>,
}

impl CacheEntry {
    /// Whether the request carries the header values this entry varied on.
    pub fn matches_request(&self, request_headers: &BTreeMap<String, String>) -> bool {
        self.vary_headers
            .iter()
            .all(|(name, value)| header_value(request_headers, name) == value.as_deref())
    }

    /// Whether the entry can be served without asking the server.
    pub fn up_to_date(&self, now: DateTime<Utc>) -> bool {
        match self.max_age {
            Some(max_age) => {
                let age = now.signed_duration_since(self.local_date).num_seconds();
                age < i64::try_from(max_age).unwrap_or(i64::MAX)
            }
            None => true,
        }
    }

    /// Conditional headers for revalidating a stale entry.
    pub fn revalidation_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(etag) = &self.etag {
            headers.push(("If-None-Match", etag.clone()));
        }
        if let Some(last_modified) = &self.last_modified {
            headers.push(("If-Modified-Since", last_modified.clone()));
        }
        headers
    }
}

/// How a response may be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachingInfo {
    pub max_age: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub vary_headers: BTreeMap<String, Option<String>>,
}

/// Work out whether and how long a response may be cached.
///
/// Returns `None` for `no-store` responses and for `no-cache` responses that
/// carry no validator.
pub fn caching_info(
    request_headers: &BTreeMap<String, String>,
    response_headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<CachingInfo> {
    let get = |name| {
        response_headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    let mut max_age = None;
    let mut no_cache = false;

    if let Some(expires) = get(EXPIRES) {
        match DateTime::parse_from_rfc2822(&expires) {
            Ok(expires) => {
                let remaining = expires.with_timezone(&Utc).signed_duration_since(now);
                max_age = Some(u64::try_from(remaining.num_seconds()).unwrap_or(0));
            }
            Err(_) => {
                tracing::warn!(expires, "Ignoring Expires header in an unexpected format");
            }
        }
    }

    for directive in split_csv(&get(CACHE_CONTROL).unwrap_or_default()) {
        if let Some(value) = directive.strip_prefix("max-age") {
            if let Some(seconds) = value
                .trim_start()
                .strip_prefix('=')
                .and_then(|seconds| seconds.trim().parse().ok())
            {
                max_age = Some(seconds);
            }
        } else if directive.starts_with("no-cache") || directive == "must-revalidate" {
            no_cache = true;
        } else if directive == "no-store" {
            return None;
        }
    }

    if get(PRAGMA).is_some_and(|pragma| pragma.contains("no-cache")) {
        no_cache = true;
    }

    let etag = get(ETAG);
    let last_modified = get(LAST_MODIFIED);
    let vary_headers = get(VARY)
        .map(|vary| {
            split_csv(&vary)
                .into_iter()
                .filter(|name| !name.is_empty())
                .map(|name| {
                    let name = name.to_ascii_lowercase();
                    let value = header_value(request_headers, &name).map(str::to_string);
                    (name, value)
                })
                .collect()
        })
        .unwrap_or_default();

    if no_cache {
        if etag.is_none() && last_modified.is_none() {
            return None;
        }
        max_age = Some(0);
    }

    Some(CachingInfo {
        max_age,
        etag,
        last_modified,
        vary_headers,
    })
}

/// Result of looking a request up in the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Serve without a request.
    Fresh(CacheEntry),
    /// Revalidate with the server first.
    Stale(CacheEntry),
    Miss,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    entries: Vec<CacheEntry>,
}

/// The response cache.
#[derive(Debug)]
pub struct ApiCache {
    path: Option<PathBuf>,
    entries: Mutex<Vec<CacheEntry>>,
}

impl ApiCache {
    /// A cache that never touches disk.
    pub fn in_memory() -> Self {
        tracing::debug!("Creating API cache in memory");
        Self {
            path: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Open the cache at `path`, or the default location.
    ///
    /// A missing, unreadable or outdated file starts an empty cache.
    pub fn open(path: Option<PathBuf>) -> Self {
        let Some(path) = path.or_else(Self::default_path) else {
            tracing::warn!("No cache directory available, keeping the API cache in memory");
            return Self::in_memory();
        };

        let entries = match load_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not read the API cache, starting with an empty one"
                );
                Vec::new()
            }
        };

        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    /// `<user cache dir>/hyperapi/apicache.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("hyperapi").join("apicache.json"))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Find the entry for a GET request.
    pub fn lookup(
        &self,
        url: &str,
        request_headers: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> CacheLookup {
        let entries = self.entries.lock();
        match entries
            .iter()
            .find(|entry| entry.url == url && entry.matches_request(request_headers))
        {
            Some(entry) if entry.up_to_date(now) => CacheLookup::Fresh(entry.clone()),
            Some(entry) => CacheLookup::Stale(entry.clone()),
            None => CacheLookup::Miss,
        }
    }

    /// Record a 2xx response, replacing any entry for the same request.
    ///
    /// Returns whether the response was cacheable. When it is not, an
    /// existing entry for the request is removed.
    pub fn store(
        &self,
        url: &str,
        request_headers: &BTreeMap<String, String>,
        response_headers: &HeaderMap,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> bool {
        let info = caching_info(request_headers, response_headers, now);
        let header = |name: &str| {
            response_headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        {
            let mut entries = self.entries.lock();
            entries.retain(|entry| !(entry.url == url && entry.matches_request(request_headers)));

            match info {
                Some(info) => {
                    tracing::debug!(url, "Added cache entry for GET request");
                    entries.push(CacheEntry {
                        url: url.to_string(),
                        vary_headers: info.vary_headers,
                        max_age: info.max_age,
                        etag: info.etag,
                        local_date: now,
                        last_modified: info.last_modified,
                        mime_type: header("content-type"),
                        item_mime_type: header("item-content-type"),
                        response_body: body.to_vec(),
                    });
                }
                None => tracing::debug!(url, "GET request cannot be cached"),
            }
        }

        self.persist();
        self.lookup(url, request_headers, now) != CacheLookup::Miss
    }

    /// Mark an entry as freshly validated after a 304.
    pub fn refresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> CacheEntry {
        let mut refreshed = entry.clone();
        refreshed.local_date = now;

        {
            let mut entries = self.entries.lock();
            if let Some(existing) = entries
                .iter_mut()
                .find(|e| e.url == entry.url && e.vary_headers == entry.vary_headers)
            {
                existing.local_date = now;
            }
        }

        self.persist();
        refreshed
    }

    /// Remove every entry and persist the empty cache.
    pub fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        self.write()
    }

    fn persist(&self) {
        if let Err(e) = self.write() {
            tracing::warn!(error = %e, "Could not write the API cache");
        }
    }

    fn write(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(dir) = path.parent() {
            if !dir.exists() {
                tracing::debug!(dir = %dir.display(), "Creating cache directory");
                fs::create_dir_all(dir)?;
            }
        }

        let file = CacheFile {
            version: SCHEMA_VERSION,
            entries: self.entries.lock().clone(),
        };
        let text = serde_json::to_string(&file)
            .map_err(|e| HyperApiError::Cache(format!("could not encode the cache: {e}")))?;
        fs::write(path, text)?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<Vec<CacheEntry>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "API cache does not exist yet");
        return Ok(Vec::new());
    }

    let text = fs::read_to_string(path)?;
    let file: CacheFile = serde_json::from_str(&text).map_err(|e| {
        HyperApiError::Cache(format!("{}: {e}", path.display()))
    })?;

    if file.version != SCHEMA_VERSION {
        tracing::debug!(version = file.version, "Discarding API cache with an old schema");
        return Ok(Vec::new());
    }

    Ok(file.entries)
}

fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn split_csv(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_max_age() {
        let info = caching_info(
            &BTreeMap::new(),
            &headers(&[("cache-control", "public, max-age=60"), ("etag", "\"abc\"")]),
            now(),
        )
        .unwrap();

        assert_eq!(info.max_age, Some(60));
        assert_eq!(info.etag.as_deref(), Some("\"abc\""));
    }

    #[test]
    fn test_expires_in_the_past() {
        let info = caching_info(
            &BTreeMap::new(),
            &headers(&[("expires", "Wed, 01 May 2024 11:00:00 GMT")]),
            now(),
        )
        .unwrap();
        assert_eq!(info.max_age, Some(0));

        let info = caching_info(
            &BTreeMap::new(),
            &headers(&[("expires", "Wed, 01 May 2024 12:05:00 GMT")]),
            now(),
        )
        .unwrap();
        assert_eq!(info.max_age, Some(300));
    }

    #[test]
    fn test_uncacheable_responses() {
        assert!(caching_info(
            &BTreeMap::new(),
            &headers(&[("cache-control", "no-store")]),
            now()
        )
        .is_none());
        assert!(caching_info(
            &BTreeMap::new(),
            &headers(&[("cache-control", "no-cache")]),
            now()
        )
        .is_none());
        assert!(caching_info(&BTreeMap::new(), &headers(&[("pragma", "no-cache")]), now()).is_none());

        let info = caching_info(
            &BTreeMap::new(),
            &headers(&[("cache-control", "must-revalidate"), ("last-modified", "yesterday")]),
            now(),
        )
        .unwrap();
        assert_eq!(info.max_age, Some(0));
    }

    #[test]
    fn test_vary_headers_select_entries() {
        let cache = ApiCache::in_memory();
        let mut json_request = BTreeMap::new();
        json_request.insert("Accept".to_string(), "application/json".to_string());
        let mut xml_request = BTreeMap::new();
        xml_request.insert("Accept".to_string(), "application/xml".to_string());

        let response = headers(&[
            ("cache-control", "max-age=60"),
            ("vary", "Accept"),
            ("content-type", "application/json"),
        ]);
        assert!(cache.store("http://example.com/api/", &json_request, &response, b"{}", now()));

        assert!(matches!(
            cache.lookup("http://example.com/api/", &json_request, now()),
            CacheLookup::Fresh(ref entry) if entry.mime_type.as_deref() == Some("application/json")
        ));
        assert_eq!(
            cache.lookup("http://example.com/api/", &xml_request, now()),
            CacheLookup::Miss
        );
    }

    #[test]
    fn test_stale_entries_revalidate() {
        let cache = ApiCache::in_memory();
        let response = headers(&[("cache-control", "max-age=10"), ("etag", "\"v1\"")]);
        cache.store("http://example.com/api/", &BTreeMap::new(), &response, b"{}", now());

        let later = now() + Duration::seconds(30);
        let CacheLookup::Stale(entry) = cache.lookup("http://example.com/api/", &BTreeMap::new(), later)
        else {
            panic!("expected a stale entry");
        };
        assert_eq!(entry.revalidation_headers(), [("If-None-Match", "\"v1\"".to_string())]);

        let refreshed = cache.refresh(&entry, later);
        assert!(refreshed.up_to_date(later));
        assert!(matches!(
            cache.lookup("http://example.com/api/", &BTreeMap::new(), later),
            CacheLookup::Fresh(_)
        ));
    }

    #[test]
    fn test_no_longer_cacheable_removes_entry() {
        let cache = ApiCache::in_memory();
        cache.store(
            "http://example.com/api/",
            &BTreeMap::new(),
            &headers(&[("cache-control", "max-age=10")]),
            b"{}",
            now(),
        );
        assert!(!cache.store(
            "http://example.com/api/",
            &BTreeMap::new(),
            &headers(&[("cache-control", "no-store")]),
            b"{}",
            now(),
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_persists_and_discards_old_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("apicache.json");

        let cache = ApiCache::open(Some(path.clone()));
        cache.store(
            "http://example.com/api/",
            &BTreeMap::new(),
            &headers(&[("cache-control", "max-age=60")]),
            &[0, 159, 146, 150],
            now(),
        );

        let reopened = ApiCache::open(Some(path.clone()));
        let CacheLookup::Fresh(entry) = reopened.lookup("http://example.com/api/", &BTreeMap::new(), now())
        else {
            panic!("expected the persisted entry");
        };
        assert_eq!(entry.response_body, [0, 159, 146, 150]);

        fs::write(&path, r#"{"version": 1, "entries": []}"#).unwrap();
        assert!(ApiCache::open(Some(path.clone())).is_empty());

        reopened.clear().unwrap();
        assert!(ApiCache::open(Some(path)).is_empty());
    }
}
