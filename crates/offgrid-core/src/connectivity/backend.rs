use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::browser::{BrowserBackend, BrowserSignals};
use super::listeners::{Listener, Subscription};
use super::native::NativeBackend;
use super::state::PlatformSignal;
use crate::config::Config;
use crate::error::{ConfigError, ProbeError};

/// Platform source of connectivity truth.
///
/// Backends report raw `PlatformSignal`s; the monitor normalizes them into
/// `NetworkState`. `probe_once` must resolve within a bounded time;
/// implementations apply their own timeout and report a degraded signal
/// rather than hang.
#[async_trait]
pub trait ConnectivityBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe_once(&self) -> Result<PlatformSignal, ProbeError>;

    /// Push notifications for transitions the platform detects on its own.
    fn subscribe(&self, on_change: Listener<PlatformSignal>) -> Subscription;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Native,
    Browser,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            Platform::Browser
        } else {
            Platform::Native
        }
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Platform::Native),
            "browser" | "web" => Ok(Platform::Browser),
            other => Err(ConfigError::UnknownPlatform(other.to_string())),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Native => write!(f, "native"),
            Platform::Browser => write!(f, "browser"),
        }
    }
}

/// The backend chosen at startup. For the browser polyfill, `browser_signals`
/// is the handle the host uses to forward `online`/`offline` events.
pub struct SelectedBackend {
    pub platform: Platform,
    pub backend: Arc<dyn ConnectivityBackend>,
    pub browser_signals: Option<BrowserSignals>,
}

/// Build the backend for `platform`. Called once per process; the choice is
/// not revisited at runtime.
pub fn select_backend(platform: Platform, config: &Config) -> Result<SelectedBackend, ProbeError> {
    info!(%platform, "Selecting connectivity backend");
    match platform {
        Platform::Native => Ok(SelectedBackend {
            platform,
            backend: Arc::new(NativeBackend::from_config(config)),
            browser_signals: None,
        }),
        Platform::Browser => {
            let backend = BrowserBackend::from_config(config)?;
            let signals = backend.signals();
            Ok(SelectedBackend {
                platform,
                backend: Arc::new(backend),
                browser_signals: Some(signals),
            })
        }
    }
}
