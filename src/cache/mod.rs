//! Client-side HTTP cache.
//!
//! [`CachingClient`] wraps any [`Transport`] and keeps successful `GET`
//! responses in memory. Fresh copies are served without touching the network,
//! stale copies are revalidated with a conditional request, and any unsafe
//! request drops what is stored for its target. Every response that leaves the
//! layer carries the local-cache-status header describing which of those
//! paths it took.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::client::{ClientError, Transport};
use crate::http::headers::names;
use crate::{Headers, Method, Request, Response, StatusCode};

/// How the cache layer handled one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVerdict {
    /// Served from the store without contacting the origin.
    Hit,
    /// Fetched from the origin and stored.
    Miss,
    /// Stored copy confirmed by the origin with `304 Not Modified`.
    Revalidated,
    /// Passed straight through; nothing was stored.
    NotCacheable,
}

impl CacheVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Revalidated => "revalidated",
            Self::NotCacheable => "not-cacheable",
        }
    }
}

impl fmt::Display for CacheVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `Cache-Control` directives the cache acts on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Directives {
    no_store: bool,
    no_cache: bool,
    max_age: Option<Duration>,
}

impl Directives {
    fn from_headers(headers: &Headers) -> Self {
        let mut d = Self::default();
        for value in headers.get_all(names::CACHE_CONTROL) {
            for directive in value.split(',').map(str::trim) {
                let (name, arg) = match directive.split_once('=') {
                    Some((n, a)) => (n.trim(), Some(a.trim().trim_matches('"'))),
                    None => (directive, None),
                };
                if name.eq_ignore_ascii_case("no-store") {
                    d.no_store = true;
                } else if name.eq_ignore_ascii_case("no-cache") {
                    d.no_cache = true;
                } else if name.eq_ignore_ascii_case("max-age") {
                    d.max_age = arg.and_then(|a| a.parse().ok()).map(Duration::from_secs);
                }
            }
        }
        d
    }
}

#[derive(Debug, Clone)]
struct Entry {
    response: Response,
    stored_at: Instant,
    directives: Directives,
    // Position in `Store::order`.
    seq: u64,
}

impl Entry {
    fn is_fresh(&self) -> bool {
        if self.directives.no_cache {
            return false;
        }
        self.directives
            .max_age
            .is_some_and(|max_age| self.stored_at.elapsed() < max_age)
    }

    fn validators(&self) -> (Option<String>, Option<String>) {
        let headers = self.response.headers();
        (
            headers.get(names::ETAG).map(str::to_owned),
            headers.get(names::LAST_MODIFIED).map(str::to_owned),
        )
    }
}

/// Counters for what the cache has done since it was created.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    revalidations: AtomicU64,
    passthroughs: AtomicU64,
}

impl CacheStats {
    fn record(&self, verdict: CacheVerdict) {
        let counter = match verdict {
            CacheVerdict::Hit => &self.hits,
            CacheVerdict::Miss => &self.misses,
            CacheVerdict::Revalidated => &self.revalidations,
            CacheVerdict::NotCacheable => &self.passthroughs,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn revalidations(&self) -> u64 {
        self.revalidations.load(Ordering::Relaxed)
    }

    pub fn passthroughs(&self) -> u64 {
        self.passthroughs.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, Entry>,
    // Keys by store sequence; the first entry is the oldest.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Store {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    /// Puts `entry` under `key` as the newest entry, evicting the oldest
    /// ones so that at most `capacity` remain.
    fn insert(&mut self, key: &str, mut entry: Entry, capacity: usize) {
        self.remove(key);
        while self.entries.len() >= capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            trace!(key = %oldest, "evicting oldest cache entry");
            self.entries.remove(&oldest);
        }

        entry.seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(entry.seq, key.to_owned());
        self.entries.insert(key.to_owned(), entry);
    }
}

/// A [`Transport`] that caches `GET` responses from the transport it wraps.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use cachelens::cache::CachingClient;
/// use cachelens::client::{ClientError, HttpClient};
///
/// let http = HttpClient::new("127.0.0.1:8080", Duration::from_secs(10))?;
/// let client = CachingClient::new(http, 256).invalidating("/api/cars");
/// # Ok::<(), ClientError>(())
/// ```
pub struct CachingClient<T> {
    inner: T,
    store: Mutex<Store>,
    capacity: usize,
    // Targets dropped by every unsafe request, e.g. the collection a write
    // to one item also changes.
    dependents: Vec<String>,
    stats: CacheStats,
}

impl<T: Transport> CachingClient<T> {
    /// Wraps `inner`, keeping at most `capacity` responses.
    pub fn new(inner: T, capacity: usize) -> Self {
        Self {
            inner,
            store: Mutex::new(Store::default()),
            capacity: capacity.max(1),
            dependents: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    /// Also drop `target` whenever any unsafe request goes through.
    #[must_use]
    pub fn invalidating(mut self, target: impl Into<String>) -> Self {
        self.dependents.push(target.into());
        self
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of stored responses.
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<Entry> {
        self.store.lock().entries.get(key).cloned()
    }

    fn invalidate(&self, key: &str) {
        let mut store = self.store.lock();
        store.remove(key);
        for dependent in &self.dependents {
            store.remove(dependent);
        }
    }

    /// Stores `response` under `key` if it may be reused. Returns whether it was stored.
    fn store(&self, key: &str, response: &Response) -> bool {
        let directives = Directives::from_headers(response.headers());
        let mut store = self.store.lock();

        if response.status() != StatusCode::Ok || directives.no_store {
            store.remove(key);
            return false;
        }

        let mut kept = response.clone();
        kept.headers_mut().remove(names::SERVER_CACHE);
        kept.headers_mut().remove(names::CLIENT_CACHE);

        let entry = Entry {
            response: kept,
            stored_at: Instant::now(),
            directives,
            seq: 0,
        };
        store.insert(key, entry, self.capacity);
        true
    }

    /// Applies a `304` to the stored entry and returns the response to hand out.
    fn refresh(&self, key: &str, mut entry: Entry, not_modified: &Response) -> Response {
        for name in [names::ETAG, names::LAST_MODIFIED, names::CACHE_CONTROL] {
            entry
                .response
                .headers_mut()
                .copy_from(not_modified.headers(), name);
        }
        entry.directives = Directives::from_headers(entry.response.headers());
        entry.stored_at = Instant::now();

        let mut served = entry.response.clone();
        self.store.lock().insert(key, entry, self.capacity);

        served
            .headers_mut()
            .copy_from(not_modified.headers(), names::SERVER_CACHE);
        served
    }

    fn finish(&self, mut response: Response, verdict: CacheVerdict, target: &str) -> Response {
        self.stats.record(verdict);
        debug!(%target, %verdict, "cache verdict");
        response
            .headers_mut()
            .set(names::CLIENT_CACHE, verdict.as_str());
        response
    }
}

impl<T: Transport> Transport for CachingClient<T> {
    async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let key = request.target();

        if request.method() != &Method::Get {
            let unsafe_method = !request.method().is_safe();
            let response = self.inner.send(request).await?;
            if unsafe_method {
                self.invalidate(&key);
            }
            return Ok(self.finish(response, CacheVerdict::NotCacheable, &key));
        }

        let Some(entry) = self.lookup(&key) else {
            let response = self.inner.send(request).await?;
            let verdict = if self.store(&key, &response) {
                CacheVerdict::Miss
            } else {
                CacheVerdict::NotCacheable
            };
            return Ok(self.finish(response, verdict, &key));
        };

        if entry.is_fresh() {
            return Ok(self.finish(entry.response, CacheVerdict::Hit, &key));
        }

        let (etag, last_modified) = entry.validators();
        let mut conditional = request;
        if let Some(etag) = etag {
            conditional = conditional.header(names::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = last_modified {
            conditional = conditional.header(names::IF_MODIFIED_SINCE, last_modified);
        }

        let response = self.inner.send(conditional).await?;
        if response.status() == StatusCode::NotModified {
            let served = self.refresh(&key, entry, &response);
            return Ok(self.finish(served, CacheVerdict::Revalidated, &key));
        }

        let verdict = if self.store(&key, &response) {
            CacheVerdict::Miss
        } else {
            CacheVerdict::NotCacheable
        };
        Ok(self.finish(response, verdict, &key))
    }
}
