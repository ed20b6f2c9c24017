//! Response cache over [`KeyValueStore`].
//!
//! Keys are `<prefix><operation>_<params>` where params is the canonical JSON
//! of the request (object keys sorted), so equal requests hit the same entry.
//! Expiry is checked lazily on read; there is no size-based eviction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use super::storage::KeyValueStore;

/// Prefix of the per-endpoint API cache.
pub const API_CACHE_PREFIX: &str = "api_cache_";

/// Prefix of the transit/natal/Panchang cache.
pub const ASTRO_CACHE_PREFIX: &str = "astro_cache_";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    After(Duration),
    /// Entries are served regardless of age.
    Never,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    payload: serde_json::Value,
    /// Milliseconds since the Unix epoch.
    timestamp: i64,
}

#[derive(Clone)]
pub struct ResponseCache {
    storage: Arc<dyn KeyValueStore>,
    prefix: &'static str,
    expiry: Expiry,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        prefix: &'static str,
        expiry: Expiry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            prefix,
            expiry,
            clock,
        }
    }

    /// The per-endpoint API cache. Its entries never expire on read.
    pub fn api(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::new(storage, API_CACHE_PREFIX, Expiry::Never, Arc::new(SystemClock))
    }

    /// The transit/natal/Panchang cache with a fixed lifetime.
    pub fn astro(storage: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self::new(
            storage,
            ASTRO_CACHE_PREFIX,
            Expiry::After(ttl),
            Arc::new(SystemClock),
        )
    }

    #[must_use]
    pub fn key(&self, operation: &str, params: &impl Serialize) -> String {
        // Going through Value sorts object keys.
        let canonical = serde_json::to_value(params)
            .and_then(|v| serde_json::to_string(&v))
            .unwrap_or_default();
        format!("{}{operation}_{canonical}", self.prefix)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.storage.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Discarding corrupt cache entry");
                self.evict(key).await;
                return None;
            }
        };

        if self.is_expired(entry.timestamp) {
            debug!(key, "Cache entry expired");
            self.evict(key).await;
            return None;
        }

        match serde_json::from_value(entry.payload) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(key, error = %e, "Cached payload has unexpected shape");
                None
            }
        }
    }

    /// Stores `payload`, replacing any previous entry. Failures are logged
    /// and otherwise ignored.
    pub async fn set<T: Serialize>(&self, key: &str, payload: &T) {
        let entry = match serde_json::to_value(payload) {
            Ok(payload) => CacheEntry {
                payload,
                timestamp: self.clock.now().timestamp_millis(),
            },
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache payload");
                return;
            }
        };

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        if let Err(e) = self.storage.set(key, &raw).await {
            warn!(key, error = %e, "Cache write failed, continuing without cache");
        }
    }

    pub async fn get_for<T: DeserializeOwned>(
        &self,
        operation: &str,
        params: &impl Serialize,
    ) -> Option<T> {
        self.get(&self.key(operation, params)).await
    }

    pub async fn set_for<T: Serialize>(
        &self,
        operation: &str,
        params: &impl Serialize,
        payload: &T,
    ) {
        self.set(&self.key(operation, params), payload).await;
    }

    /// Serves from cache when possible, otherwise runs `fetch` and stores a
    /// successful result.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        operation: &str,
        params: &impl Serialize,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.key(operation, params);
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }

        let value = fetch().await?;
        self.set(&key, &value).await;
        Ok(value)
    }

    /// Drops every entry of this cache whose params carry `profile_id` as a
    /// JSON string value. `p-1` does not match `p-10`.
    pub async fn invalidate_profile(&self, profile_id: &str) {
        let token = serde_json::Value::String(profile_id.to_string()).to_string();
        self.remove_matching(|key| key.contains(&token)).await;
    }

    pub async fn clear(&self) {
        self.remove_matching(|_| true).await;
    }

    async fn remove_matching(&self, matches: impl Fn(&str) -> bool) {
        let keys = match self.storage.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list cache keys");
                return;
            }
        };

        for key in keys
            .iter()
            .filter(|k| k.starts_with(self.prefix) && matches(k.as_str()))
        {
            self.evict(key).await;
        }
    }

    fn is_expired(&self, timestamp_ms: i64) -> bool {
        match self.expiry {
            Expiry::Never => false,
            Expiry::After(ttl) => {
                self.clock.now().timestamp_millis() - timestamp_ms > ttl.num_milliseconds()
            }
        }
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.storage.remove(key).await {
            warn!(key, error = %e, "Failed to evict cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;
    use serde_json::json;

    fn expiring(storage: Arc<MemoryStorage>, clock: Arc<ManualClock>) -> ResponseCache {
        ResponseCache::new(
            storage,
            ASTRO_CACHE_PREFIX,
            Expiry::After(Duration::hours(6)),
            clock,
        )
    }

    #[tokio::test]
    async fn set_then_get_returns_payload() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = ResponseCache::api(storage);
        let payload = json!({"planets": [{"name": "Sun", "sign": "Capricorn"}]});

        cache.set("k", &payload).await;
        let hit: Option<serde_json::Value> = cache.get("k").await;
        assert_eq!(hit, Some(payload));
    }

    #[tokio::test]
    async fn expired_entry_is_absent_and_evicted() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = expiring(storage.clone(), clock.clone());

        cache.set("astro_cache_transits_x", &json!({"ok": true})).await;

        clock.advance(Duration::hours(5));
        let hit: Option<serde_json::Value> = cache.get("astro_cache_transits_x").await;
        assert!(hit.is_some());

        clock.advance(Duration::hours(2));
        let hit: Option<serde_json::Value> = cache.get("astro_cache_transits_x").await;
        assert!(hit.is_none());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn api_cache_never_expires() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = ResponseCache::new(storage, API_CACHE_PREFIX, Expiry::Never, clock.clone());

        cache.set("k", &json!(1)).await;
        clock.advance(Duration::days(30));
        assert_eq!(cache.get::<i32>("k").await, Some(1));
    }

    #[tokio::test]
    async fn key_is_independent_of_field_order() {
        let cache = ResponseCache::api(Arc::new(MemoryStorage::new()));
        let a = cache.key("dasha", &json!({"date": "1990-01-01", "lat": 1.0}));
        let b = cache.key("dasha", &json!({"lat": 1.0, "date": "1990-01-01"}));
        assert_eq!(a, b);
        assert!(a.starts_with("api_cache_dasha_"));
    }

    #[tokio::test]
    async fn write_failure_is_swallowed() {
        let storage = Arc::new(MemoryStorage::with_quota(8));
        let cache = ResponseCache::api(storage.clone());

        cache.set("k", &json!({"large": "payload that does not fit"})).await;
        assert!(cache.get::<serde_json::Value>("k").await.is_none());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("api_cache_x", "{not json").await.unwrap();
        let cache = ResponseCache::api(storage.clone());

        assert!(cache.get::<serde_json::Value>("api_cache_x").await.is_none());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn get_or_fetch_only_fetches_on_miss() {
        let cache = ResponseCache::api(Arc::new(MemoryStorage::new()));
        let params = json!({"date": "2026-10-18"});

        let first: Result<i32, ()> = cache
            .get_or_fetch("panchang", &params, || async { Ok(7) })
            .await;
        assert_eq!(first, Ok(7));

        let second: Result<i32, ()> = cache
            .get_or_fetch("panchang", &params, || async { Err(()) })
            .await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn invalidate_profile_only_touches_matching_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = ResponseCache::api(storage.clone());

        cache.set_for("chart", &json!({"profile": "p-1"}), &json!(1)).await;
        cache.set_for("chart", &json!({"profile": "p-2"}), &json!(2)).await;
        storage.set("futurebot-storage", "{}").await.unwrap();

        cache.invalidate_profile("p-1").await;

        assert!(cache.get_for::<i32>("chart", &json!({"profile": "p-1"})).await.is_none());
        assert_eq!(cache.get_for::<i32>("chart", &json!({"profile": "p-2"})).await, Some(2));
        assert!(storage.get("futurebot-storage").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_profile_matches_whole_id() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = ResponseCache::api(storage);

        for id in ["p-1", "p-10", "p-1x"] {
            cache.set_for("chart", &json!({"profile": id}), &json!(id)).await;
        }

        cache.invalidate_profile("p-1").await;

        assert!(cache.get_for::<String>("chart", &json!({"profile": "p-1"})).await.is_none());
        for id in ["p-10", "p-1x"] {
            assert_eq!(
                cache.get_for::<String>("chart", &json!({"profile": id})).await.as_deref(),
                Some(id)
            );
        }
    }
}
