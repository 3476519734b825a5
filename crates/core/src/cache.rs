//! TTL cache for per-city results.
//!
//! Entries are replaced wholesale, never mutated. Values sit behind an
//! `Arc` so a cache hit hands back the very object the first fetch built.
//! A per-key async lock makes concurrent misses for one key share a single
//! refresh.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use metroscope_transit::CityIdentifier;
use tokio::sync::Mutex;

// ============================================================================
// Clocks
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

// ============================================================================
// Keys and entries
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Network,
    Ridership,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Subsystem::Network => "network",
            Subsystem::Ridership => "ridership",
        })
    }
}

/// `(subsystem, city[, variant])`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subsystem: Subsystem,
    pub city: CityIdentifier,
    pub variant: Option<String>,
}

impl CacheKey {
    pub fn new(subsystem: Subsystem, city: CityIdentifier) -> Self {
        Self {
            subsystem,
            city,
            variant: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subsystem, self.city)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct CacheEntry<T> {
    pub value: Arc<T>,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
        }
    }
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now.signed_duration_since(self.fetched_at) < ttl
    }
}

// ============================================================================
// Cache
// ============================================================================

pub struct TtlCache<T> {
    entries: DashMap<CacheKey, CacheEntry<T>>,
    refreshing: DashMap<CacheKey, Arc<Mutex<()>>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl<T: Send + Sync> TtlCache<T> {
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            refreshing: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Cached value if it is still within its TTL
    pub fn get_fresh(&self, key: &CacheKey) -> Option<Arc<T>> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Cached entry regardless of age
    pub fn get_any(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn insert(&self, key: CacheKey, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.entries.insert(
            key,
            CacheEntry {
                value: Arc::clone(&value),
                fetched_at: self.clock.now(),
            },
        );
        value
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh cached value, or the result of `refresh` stored under `key`.
    ///
    /// Only one refresh per key runs at a time; callers arriving while it
    /// runs wait for it and then read its result. If the refresh fails and
    /// an expired entry exists, the expired value is served instead of the
    /// error.
    pub async fn get_or_refresh<F, Fut, E>(&self, key: CacheKey, refresh: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if let Some(value) = self.get_fresh(&key) {
            tracing::debug!("cache hit for {}", key);
            return Ok(value);
        }

        let lock = Arc::clone(self.refreshing.entry(key.clone()).or_default().value());
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(value) = self.get_fresh(&key) {
            return Ok(value);
        }

        match refresh().await {
            Ok(value) => Ok(self.insert(key, value)),
            Err(e) => match self.get_any(&key) {
                Some(stale) => {
                    tracing::warn!(
                        "refresh of {} failed, serving entry from {}: {}",
                        key,
                        stale.fetched_at,
                        e
                    );
                    Ok(stale.value)
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn key(city: &str) -> CacheKey {
        CacheKey::new(Subsystem::Network, CityIdentifier::new(city))
    }

    fn cache(clock: &Arc<ManualClock>) -> TtlCache<String> {
        TtlCache::new(TimeDelta::hours(24), clock.clone())
    }

    #[test]
    fn test_freshness_window() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let stored = cache.insert(key("a"), "x".to_string());

        clock.advance(TimeDelta::hours(23));
        assert!(Arc::ptr_eq(&cache.get_fresh(&key("a")).unwrap(), &stored));

        clock.advance(TimeDelta::hours(1));
        assert!(cache.get_fresh(&key("a")).is_none());
        assert!(cache.get_any(&key("a")).is_some());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key("mumbai").to_string(), "network/mumbai");
        let k = CacheKey::new(Subsystem::Ridership, CityIdentifier::new("delhi")).with_variant("2024");
        assert_eq!(k.to_string(), "ridership/delhi/2024");
    }

    #[tokio::test]
    async fn test_refresh_only_on_expiry() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let calls = AtomicUsize::new(0);
        let refresh = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>("value".to_string())
        };

        let first = cache.get_or_refresh(key("a"), refresh).await.unwrap();
        let second = cache.get_or_refresh(key("a"), refresh).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(TimeDelta::hours(25));
        let third = cache.get_or_refresh(key("a"), refresh).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_value_served_on_failure() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let first = cache
            .get_or_refresh(key("a"), || async { Ok::<_, String>("old".to_string()) })
            .await
            .unwrap();

        clock.advance(TimeDelta::days(2));
        let served = cache
            .get_or_refresh(key("a"), || async { Err::<String, _>("upstream down".to_string()) })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &served));

        let missing = cache
            .get_or_refresh(key("b"), || async { Err::<String, _>("upstream down".to_string()) })
            .await;
        assert_eq!(missing.unwrap_err(), "upstream down");
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_refresh() {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(cache(&clock));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_refresh(key("a"), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok::<_, String>("value".to_string())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
