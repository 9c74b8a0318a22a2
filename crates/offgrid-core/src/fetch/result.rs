use crate::cache::CacheEntry;

/// Outcome of a fetch with cache fallback. Exactly one of data or error is
/// present; `Cached` marks data served from the fallback cache.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult<T, E> {
    Live(T),
    Cached { data: T, stored_at_millis: i64 },
    Failed(E),
}

impl<T, E> FetchResult<T, E> {
    pub fn data(&self) -> Option<&T> {
        match self {
            FetchResult::Live(data) | FetchResult::Cached { data, .. } => Some(data),
            FetchResult::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            FetchResult::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_from_cache(&self) -> bool {
        matches!(self, FetchResult::Cached { .. })
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            FetchResult::Live(data) | FetchResult::Cached { data, .. } => Ok(data),
            FetchResult::Failed(error) => Err(error),
        }
    }

    /// "Showing saved data from 5m ago" for cached results.
    pub fn saved_data_notice(&self, now_millis: i64) -> Option<String> {
        match self {
            FetchResult::Cached { stored_at_millis, .. } => {
                let age = CacheEntry::new("", (), *stored_at_millis).age_display(now_millis);
                Some(format!("Showing saved data from {}", age))
            }
            _ => None,
        }
    }
}
