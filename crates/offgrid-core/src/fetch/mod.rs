//! Offline-resilient reads.
//!
//! `FetchOrchestrator::fetch_with_fallback` always attempts the live fetch
//! first. Its outcome, not the monitor's last known connectivity, decides
//! whether cached data is used for a given request.

pub mod orchestrator;
pub mod result;

pub use orchestrator::FetchOrchestrator;
pub use result::FetchResult;
