//! TTL caches — memoize template, document, analysis and preview fetches.
//!
//! Each logical domain owns its own `TtlCache` with a distinct default TTL.
//! Expired entries are never observable: `get` evicts them lazily, and
//! `spawn_cache_sweeper` prunes every instance on a fixed interval.
//! The sweep is housekeeping only; correctness never depends on it.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::documents::models::AnalysisResult;
use crate::form::schema::FormSchema;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    payload: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Key-addressed, TTL-expiring store. Concurrent writers race with
/// last-writer-wins semantics.
#[derive(Debug)]
pub struct TtlCache<V> {
    name: &'static str,
    default_ttl: Duration,
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, default_ttl: Duration) -> Self {
        Self {
            name,
            default_ttl,
            entries: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the payload for `key`, evicting it first if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let payload = {
            let entry = self.entries.get(key)?;
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.payload.clone())
            }
        };

        if payload.is_none() {
            // The read guard is dropped above; removing while holding it would deadlock.
            self.entries
                .remove_if(key, |_, entry| entry.is_expired(Instant::now()));
        }
        payload
    }

    /// Stores `payload` under `key` for `ttl`, or the cache's default TTL.
    pub fn set(&self, key: impl Into<String>, payload: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries.insert(
            key.into(),
            CacheEntry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.payload)
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Live entry count, including expired entries not yet pruned or read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Returns the cached payload for `key`, otherwise runs `producer`, stores its
/// output and returns it. A failing producer leaves the cache untouched.
pub async fn fetch_with_cache<V, E, F, Fut>(
    key: &str,
    producer: F,
    cache: &TtlCache<V>,
    ttl: Option<Duration>,
) -> Result<V, E>
where
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    if let Some(hit) = cache.get(key) {
        debug!(cache = cache.name(), key, "cache hit");
        return Ok(hit);
    }

    debug!(cache = cache.name(), key, "cache miss");
    let payload = producer().await?;
    cache.set(key, payload.clone(), ttl);
    Ok(payload)
}

/// Object-safe view used by the sweeper to prune heterogeneous caches.
pub trait Prunable: Send + Sync {
    fn cache_name(&self) -> &'static str;
    fn prune_expired(&self) -> usize;
}

impl<V: Clone + Send + Sync> Prunable for TtlCache<V> {
    fn cache_name(&self) -> &'static str {
        self.name
    }

    fn prune_expired(&self) -> usize {
        self.prune()
    }
}

/// The cache instances owned by the pipeline, one per domain.
#[derive(Clone)]
pub struct PipelineCaches {
    pub templates: Arc<TtlCache<Arc<FormSchema>>>,
    pub documents: Arc<TtlCache<Bytes>>,
    pub analyses: Arc<TtlCache<AnalysisResult>>,
    pub previews: Arc<TtlCache<String>>,
}

/// Default TTLs per cache domain.
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub templates: Duration,
    pub documents: Duration,
    pub analyses: Duration,
    pub previews: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            templates: Duration::from_secs(3600),
            documents: Duration::from_secs(600),
            analyses: Duration::from_secs(1800),
            previews: Duration::from_secs(120),
        }
    }
}

impl CacheTtls {
    pub fn from_config(config: &Config) -> Self {
        Self {
            templates: config.template_cache_ttl,
            documents: config.document_cache_ttl,
            analyses: config.analysis_cache_ttl,
            previews: config.preview_cache_ttl,
        }
    }
}

impl PipelineCaches {
    pub fn new(ttls: &CacheTtls) -> Self {
        Self {
            templates: Arc::new(TtlCache::new("templates", ttls.templates)),
            documents: Arc::new(TtlCache::new("documents", ttls.documents)),
            analyses: Arc::new(TtlCache::new("analyses", ttls.analyses)),
            previews: Arc::new(TtlCache::new("previews", ttls.previews)),
        }
    }

    fn all(&self) -> Vec<Arc<dyn Prunable>> {
        vec![
            self.templates.clone(),
            self.documents.clone(),
            self.analyses.clone(),
            self.previews.clone(),
        ]
    }

    /// Prunes every instance; returns the total number of evicted entries.
    pub fn prune_all(&self) -> usize {
        self.all()
            .iter()
            .map(|cache| {
                let pruned = cache.prune_expired();
                if pruned > 0 {
                    debug!(cache = cache.cache_name(), pruned, "pruned expired entries");
                }
                pruned
            })
            .sum()
    }
}

/// Spawns the periodic sweep over all pipeline caches.
/// A zero interval is raised to one millisecond.
pub fn spawn_cache_sweeper(caches: PipelineCaches, every: Duration) -> JoinHandle<()> {
    let every = every.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick fires immediately; nothing can have expired yet.
        interval.tick().await;
        loop {
            interval.tick().await;
            let pruned = caches.prune_all();
            if pruned > 0 {
                debug!(pruned, "cache sweep finished");
            }
        }
    })
}
