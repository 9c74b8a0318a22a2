//! Local caching module for offline data access.
//!
//! This module provides the `TtlCache` for storing the last good response of
//! each logical endpoint. Entries carry their write time and are checked
//! against a caller-supplied maximum age when read; an entry found expired is
//! deleted at that point. There is no background sweep.

pub mod clock;
pub mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ttl::{CacheEntry, TtlCache};
