use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::clock::Clock;
use crate::storage::KeyValueStore;

/// Prefix shared by every cache key in the durable store, so cache entries
/// can be cleared without touching other persisted state.
const CACHE_PREFIX: &str = "@cache_";

const MILLIS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Write time, milliseconds since the Unix epoch
    pub timestamp: i64,
    pub data: T,
    /// The logical cache key this entry was stored under
    pub endpoint: String,
}

impl<T> CacheEntry<T> {
    pub fn new(endpoint: &str, data: T, timestamp: i64) -> Self {
        Self {
            timestamp,
            data,
            endpoint: endpoint.to_string(),
        }
    }

    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis - self.timestamp
    }

    pub fn age_minutes(&self, now_millis: i64) -> i64 {
        self.age_millis(now_millis) / MILLIS_PER_MINUTE
    }

    /// Present while `age <= max_age`. A timestamp in the future (clock skew)
    /// counts as fresh.
    pub fn is_fresh(&self, max_age_minutes: u64, now_millis: i64) -> bool {
        let max_age_millis = i64::try_from(max_age_minutes)
            .unwrap_or(i64::MAX)
            .saturating_mul(MILLIS_PER_MINUTE);
        self.age_millis(now_millis) <= max_age_millis
    }

    pub fn age_display(&self, now_millis: i64) -> String {
        let minutes = self.age_minutes(now_millis);
        if minutes < 1 {
            // Also covers negative ages from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                // Round up: 1d 12h+ becomes 2d
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Age-bounded cache over a durable key/value store.
///
/// Writes are best-effort: storage failures are logged and swallowed. Reads
/// that hit a storage failure behave as a miss. Concurrent `put`s to the same
/// key race and the last one to complete wins.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn storage_key(key: &str) -> String {
        format!("{}{}", CACHE_PREFIX, key)
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Overwrite the entry for `key` with `payload`, stamped now.
    pub async fn put<T: Serialize>(&self, key: &str, payload: &T) {
        let entry = CacheEntry::new(key, payload, self.clock.now_millis());
        let contents = match serde_json::to_string(&entry) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(cache = key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        match self.store.set_item(&Self::storage_key(key), &contents).await {
            Ok(()) => debug!(cache = key, "Cache entry stored"),
            Err(e) => warn!(cache = key, error = %e, "Failed to write cache entry"),
        }
    }

    /// Payload for `key` if it is no older than `max_age_minutes`.
    /// An expired entry is removed before returning `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, max_age_minutes: u64) -> Option<T> {
        self.get_entry(key, max_age_minutes)
            .await
            .map(|entry| entry.data)
    }

    /// Like `get`, but keeps the write time for provenance display.
    pub async fn get_entry<T: DeserializeOwned>(
        &self,
        key: &str,
        max_age_minutes: u64,
    ) -> Option<CacheEntry<T>> {
        let entry = self.entry::<T>(key).await?;
        let now = self.clock.now_millis();

        if entry.is_fresh(max_age_minutes, now) {
            debug!(cache = key, age = %entry.age_display(now), "Cache hit");
            Some(entry)
        } else {
            debug!(
                cache = key,
                age_minutes = entry.age_minutes(now),
                max_age_minutes,
                "Cache entry expired, evicting"
            );
            self.invalidate(key).await;
            None
        }
    }

    /// The stored entry regardless of age. Corrupt entries are removed.
    pub async fn entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let storage_key = Self::storage_key(key);
        let contents = match self.store.get_item(&storage_key).await {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                debug!(cache = key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(cache = key, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(cache = key, error = %e, "Discarding unreadable cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.remove_item(&Self::storage_key(key)).await {
            warn!(cache = key, error = %e, "Failed to remove cache entry");
        }
    }

    /// Remove every cache entry, leaving other persisted state alone.
    /// Returns how many entries were removed.
    pub async fn clear_all(&self) -> usize {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list cache entries");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(CACHE_PREFIX)) {
            match self.store.remove_item(key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %key, error = %e, "Failed to remove cache entry"),
            }
        }
        debug!(removed, "Cache cleared");
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::cache::ManualClock;
    use crate::error::StorageError;
    use crate::storage::MemoryStore;

    const T0: i64 = 1_700_000_000_000;

    fn cache() -> (TtlCache, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MemoryStore::new());
        (TtlCache::new(store.clone(), clock.clone()), clock, store)
    }

    /// Store whose every operation fails.
    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disk gone".to_string()))
        }
        async fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk gone".to_string()))
        }
        async fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk gone".to_string()))
        }
        async fn keys(&self) -> Result<Vec<String>, StorageError> {
            Err(StorageError::Unavailable("disk gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_put_then_get_returns_payload() {
        let (cache, _, _) = cache();
        cache.put("youth", &vec!["a", "b"]).await;
        let got: Option<Vec<String>> = cache.get("youth", 1).await;
        assert_eq!(got, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn test_trainings_expire_after_an_hour() {
        let (cache, clock, _) = cache();
        cache.put("trainings", &vec!["T1"]).await;

        clock.advance(Duration::from_secs(30 * 60));
        let got: Option<Vec<String>> = cache.get("trainings", 60).await;
        assert_eq!(got, Some(vec!["T1".to_string()]));

        clock.advance(Duration::from_secs(31 * 60));
        let got: Option<Vec<String>> = cache.get("trainings", 60).await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_exact_max_age_is_still_present() {
        let (cache, clock, _) = cache();
        cache.put("events", &42u32).await;

        clock.advance(Duration::from_secs(60 * 60));
        assert_eq!(cache.get::<u32>("events", 60).await, Some(42));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get::<u32>("events", 60).await, None);
    }

    #[tokio::test]
    async fn test_huge_max_age_never_expires() {
        let (cache, clock, store) = cache();
        cache.put("news", &1u32).await;
        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));

        assert_eq!(cache.get::<u32>("news", u64::MAX).await, Some(1));
        assert_eq!(cache.get::<u32>("news", i64::MAX as u64 + 1).await, Some(1));
        assert!(store.get_item("@cache_news").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted_on_read() {
        let (cache, clock, store) = cache();
        cache.put("patrols", &1u8).await;
        clock.advance(Duration::from_secs(11 * 60));

        assert_eq!(cache.get::<u8>("patrols", 10).await, None);
        assert_eq!(store.get_item("@cache_patrols").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (cache, _, _) = cache();
        cache.put("news", &"v1").await;
        cache.put("news", &"v2").await;
        assert_eq!(cache.get::<String>("news", 5).await.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let (cache, _, _) = cache();
        cache.put("news", &1).await;
        cache.invalidate("news").await;
        cache.invalidate("news").await;
        assert_eq!(cache.get::<i32>("news", 5).await, None);
    }

    #[tokio::test]
    async fn test_clear_all_leaves_other_keys() {
        let (cache, _, store) = cache();
        cache.put("news", &1).await;
        cache.put("branches", &2).await;
        store.set_item("@network_state", "{}").await.unwrap();

        assert_eq!(cache.clear_all().await, 2);
        assert_eq!(cache.get::<i32>("news", 5).await, None);
        assert_eq!(cache.get::<i32>("branches", 5).await, None);
        assert!(store.get_item("@network_state").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let (cache, _, store) = cache();
        store.set_item("@cache_news", "not json").await.unwrap();
        assert_eq!(cache.get::<i32>("news", 5).await, None);
        assert_eq!(store.get_item("@cache_news").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_storage_failures_are_swallowed() {
        let cache = TtlCache::new(Arc::new(BrokenStore), Arc::new(ManualClock::new(T0)));
        cache.put("news", &1).await;
        assert_eq!(cache.get::<i32>("news", 5).await, None);
        cache.invalidate("news").await;
        assert_eq!(cache.clear_all().await, 0);
    }

    #[tokio::test]
    async fn test_entry_serialized_shape() {
        let (cache, _, store) = cache();
        cache.put("news", &vec![1, 2]).await;

        let raw = store.get_item("@cache_news").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["timestamp"], T0);
        assert_eq!(value["endpoint"], "news");
        assert_eq!(value["data"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_age_display() {
        let entry = CacheEntry::new("youth", (), T0);
        let minutes = |m: i64| T0 + m * MILLIS_PER_MINUTE;

        assert_eq!(entry.age_display(T0), "just now");
        assert_eq!(entry.age_display(T0 - 5_000), "just now");
        assert_eq!(entry.age_display(minutes(5)), "5m ago");
        assert_eq!(entry.age_display(minutes(89)), "1h ago");
        assert_eq!(entry.age_display(minutes(90)), "2h ago");
        assert_eq!(entry.age_display(minutes(1440 + 11 * 60)), "1d ago");
        assert_eq!(entry.age_display(minutes(1440 + 12 * 60)), "2d ago");
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let entry = CacheEntry::new("youth", (), T0 + 10_000);
        assert!(entry.is_fresh(0, T0));
    }
}
