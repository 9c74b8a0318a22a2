use std::fmt::Display;
use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::result::FetchResult;
use crate::cache::TtlCache;

#[derive(Clone)]
pub struct FetchOrchestrator {
    cache: TtlCache,
}

impl FetchOrchestrator {
    pub fn new(cache: TtlCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    /// Run `fetch_fn`. On success the value is cached (empty values included)
    /// and returned as `Live`. On failure, a cache entry no older than
    /// `max_age_minutes` is returned as `Cached`; without one, the original
    /// error is returned unchanged as `Failed`.
    pub async fn fetch_with_fallback<T, E, F, Fut>(
        &self,
        key: &str,
        fetch_fn: F,
        max_age_minutes: u64,
    ) -> FetchResult<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match fetch_fn().await {
            Ok(data) => {
                debug!(cache = key, "Live fetch succeeded");
                self.cache.put(key, &data).await;
                FetchResult::Live(data)
            }
            Err(error) => match self.cache.get_entry::<T>(key, max_age_minutes).await {
                Some(entry) => {
                    warn!(
                        cache = key,
                        error = %error,
                        age = %entry.age_display(self.cache.now_millis()),
                        "Live fetch failed, serving cached data"
                    );
                    FetchResult::Cached {
                        data: entry.data,
                        stored_at_millis: entry.timestamp,
                    }
                }
                None => {
                    warn!(cache = key, error = %error, "Live fetch failed and no usable cached data");
                    FetchResult::Failed(error)
                }
            },
        }
    }

    pub fn saved_data_notice<T, E>(&self, result: &FetchResult<T, E>) -> Option<String> {
        result.saved_data_notice(self.cache.now_millis())
    }
}

// ============================================================================
// Tests
// ============================================================================
