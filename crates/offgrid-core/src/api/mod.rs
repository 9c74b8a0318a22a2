//! REST client used as the live-fetch half of `fetch_with_fallback`.
//!
//! Domain services build one `ApiClient` per backend and pass closures like
//! `|| api.get_json::<Vec<Training>>("/trainings")` to the orchestrator.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
