//! Connectivity backend for browser-style hosts.
//!
//! Browsers expose no radio state, only `navigator.onLine` and the
//! `online`/`offline` window events. The host forwards those through
//! `BrowserSignals`; the backend optionally confirms reachability with a
//! bounded `HEAD` request to a known-good URL.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::backend::ConnectivityBackend;
use super::listeners::{Listener, ListenerSet, Subscription};
use super::state::{ConnectionType, PlatformSignal, Reachability};
use crate::config::Config;
use crate::error::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserEvent {
    Online,
    Offline,
}

struct BrowserShared {
    online: AtomicBool,
    listeners: ListenerSet<PlatformSignal>,
    client: Client,
    probe_url: Option<String>,
    probe_timeout: Duration,
}

impl BrowserShared {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Link state plus, when a probe URL is configured, reachability.
    async fn probe(&self) -> PlatformSignal {
        if !self.is_online() {
            return PlatformSignal::offline();
        }
        let reachable = match self.probe_url {
            Some(ref url) => self.check_reachable(url).await,
            None => Reachability::Unknown,
        };
        PlatformSignal::new(true, reachable, Some(ConnectionType::Unknown))
    }

    async fn check_reachable(&self, url: &str) -> Reachability {
        match self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => Reachability::Reachable,
            Ok(response) => {
                debug!(url, status = %response.status(), "Reachability probe rejected");
                Reachability::Unreachable
            }
            Err(e) => {
                debug!(url, error = %e, timed_out = e.is_timeout(), "Reachability probe failed");
                Reachability::Unreachable
            }
        }
    }

    /// Push the confirmed state after coming online. A later `offline` event
    /// that lands mid-check wins.
    async fn confirm_online(self: Arc<Self>) {
        let signal = self.probe().await;
        if self.is_online() {
            self.listeners.emit(&signal);
        } else {
            debug!("Went offline during reachability check, dropping result");
        }
    }
}

/// Host-side handle for forwarding window connectivity events.
#[derive(Clone)]
pub struct BrowserSignals {
    shared: Arc<BrowserShared>,
}

impl BrowserSignals {
    pub fn dispatch(&self, event: BrowserEvent) {
        let online = event == BrowserEvent::Online;
        let was_online = self.shared.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            debug!(?event, "Ignoring repeated browser event");
            return;
        }
        debug!(?event, "Browser connectivity event");

        if !online {
            self.shared.listeners.emit(&PlatformSignal::offline());
            return;
        }
        if self.shared.probe_url.is_some() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(Arc::clone(&self.shared).confirm_online());
                    return;
                }
                Err(e) => warn!(error = %e, "No async runtime, reporting reachability as unknown"),
            }
        }
        self.shared.listeners.emit(&PlatformSignal::new(
            true,
            Reachability::Unknown,
            Some(ConnectionType::Unknown),
        ));
    }

    pub fn is_online(&self) -> bool {
        self.shared.is_online()
    }
}

pub struct BrowserBackend {
    shared: Arc<BrowserShared>,
}

impl BrowserBackend {
    pub fn new(
        initially_online: bool,
        probe_url: Option<String>,
        probe_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let client = Client::builder().timeout(probe_timeout).build()?;
        Ok(Self {
            shared: Arc::new(BrowserShared {
                online: AtomicBool::new(initially_online),
                listeners: ListenerSet::new(),
                client,
                probe_url,
                probe_timeout,
            }),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProbeError> {
        let probe_url = config
            .browser_probe
            .then(|| config.reachability_url.clone());
        Self::new(true, probe_url, config.probe_timeout())
    }

    pub fn signals(&self) -> BrowserSignals {
        BrowserSignals {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[async_trait]
impl ConnectivityBackend for BrowserBackend {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn probe_once(&self) -> Result<PlatformSignal, ProbeError> {
        Ok(self.shared.probe().await)
    }

    fn subscribe(&self, on_change: Listener<PlatformSignal>) -> Subscription {
        self.shared.listeners.add(on_change)
    }
}
