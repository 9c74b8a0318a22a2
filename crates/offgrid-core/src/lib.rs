//! Offgrid core - connectivity-aware data access for intermittently
//! connected clients.
//!
//! - `cache`: age-bounded cache over durable storage
//! - `connectivity`: network state, platform backends and the monitor
//! - `fetch`: live-first fetching with cache fallback
//! - `api`: JSON REST client usable as a live fetch
//! - `layer`: process-wide wiring of the above

pub mod api;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod fetch;
pub mod layer;
pub mod storage;

pub use cache::{CacheEntry, TtlCache};
pub use config::Config;
pub use connectivity::{ConnectivityMonitor, NetworkState, Platform, Reachability};
pub use error::{ConfigError, ProbeError, StorageError};
pub use fetch::{FetchOrchestrator, FetchResult};
pub use layer::DataLayer;
