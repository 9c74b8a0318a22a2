//! Process-wide connectivity state.
//!
//! `ConnectivityMonitor` owns the last known `NetworkState`. Two producers feed
//! it through `reconcile`: probes (initial mount, manual `check_connection`,
//! the periodic timer) and push events from the backend. Both arrive as raw
//! `PlatformSignal`s and are normalized here. A state that differs
//! from the held one (ignoring the check timestamp) is stored, persisted and
//! fanned out to subscribers; an identical one is not announced.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::backend::ConnectivityBackend;
use super::listeners::{ListenerSet, Subscription};
use super::state::{NetworkState, PlatformSignal};
use crate::config::Config;
use crate::storage::KeyValueStore;

/// Storage key for the persisted state, read back at startup for instant
/// rendering before the first probe completes.
const NETWORK_STATE_KEY: &str = "@network_state";

/// Buffer for backend push events awaiting reconciliation.
const EVENT_BUFFER_SIZE: usize = 32;

type InFlightProbe = Shared<BoxFuture<'static, NetworkState>>;

struct Inner {
    backend: Arc<dyn ConnectivityBackend>,
    store: Arc<dyn KeyValueStore>,
    state_tx: watch::Sender<NetworkState>,
    subscribers: ListenerSet<NetworkState>,
    /// Serializes reconciliation so subscribers see changes in detection order
    reconcile_lock: tokio::sync::Mutex<()>,
    in_flight: Mutex<Option<InFlightProbe>>,
    probe_interval: Duration,
}

/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl ConnectivityMonitor {
    /// Build a monitor seeded from persisted state (or the optimistic default).
    /// Nothing is probed until `check_connection` or `start`.
    pub async fn new(
        backend: Arc<dyn ConnectivityBackend>,
        store: Arc<dyn KeyValueStore>,
        config: &Config,
    ) -> Self {
        let initial = Self::load_persisted(store.as_ref()).await;
        debug!(backend = backend.name(), state = %initial.status_display(), "Connectivity monitor initialized");

        let (state_tx, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                state_tx,
                subscribers: ListenerSet::new(),
                reconcile_lock: tokio::sync::Mutex::new(()),
                in_flight: Mutex::new(None),
                probe_interval: config.probe_interval(),
            }),
        }
    }

    async fn load_persisted(store: &dyn KeyValueStore) -> NetworkState {
        match store.get_item(NETWORK_STATE_KEY).await {
            Ok(Some(contents)) => match serde_json::from_str::<NetworkState>(&contents) {
                Ok(state) => state.normalized(),
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable persisted network state");
                    NetworkState::default()
                }
            },
            Ok(None) => NetworkState::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load persisted network state");
                NetworkState::default()
            }
        }
    }

    /// Last known state. Never blocks on a probe.
    pub fn get_state(&self) -> NetworkState {
        self.inner.state_tx.borrow().clone()
    }

    /// Receiver that observes every announced state change.
    pub fn watch(&self) -> watch::Receiver<NetworkState> {
        self.inner.state_tx.subscribe()
    }

    /// Register a change callback. Called only when connectivity changes.
    pub fn on_change(
        &self,
        subscriber: impl Fn(&NetworkState) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.subscribers.add(Arc::new(subscriber))
    }

    /// Probe now and return the resulting state. While a probe is in flight,
    /// further calls wait for that probe instead of starting another.
    pub async fn check_connection(&self) -> NetworkState {
        let probe = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match slot.as_ref() {
                Some(probe) => {
                    debug!("Joining in-flight connectivity probe");
                    probe.clone()
                }
                None => {
                    let probe = Self::probe_and_reconcile(Arc::clone(&self.inner))
                        .boxed()
                        .shared();
                    *slot = Some(probe.clone());
                    probe
                }
            }
        };
        probe.await
    }

    async fn probe_and_reconcile(inner: Arc<Inner>) -> NetworkState {
        let probed = match inner.backend.probe_once().await {
            Ok(signal) => NetworkState::from_signal(&signal, Utc::now()),
            Err(e) => {
                warn!(backend = inner.backend.name(), error = %e, "Connectivity probe failed, assuming offline");
                NetworkState::offline(Utc::now())
            }
        };

        let state = inner.reconcile(probed).await;

        inner
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        state
    }

    /// Fold an observed state into the held one. Returns the held state
    /// afterwards.
    pub(crate) async fn reconcile(&self, observed: NetworkState) -> NetworkState {
        self.inner.reconcile(observed).await
    }

    /// Spawn the driver: subscribes to backend push events and probes on a
    /// fixed interval, the first tick firing immediately.
    pub fn start(&self) -> MonitorTask {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(self.clone().run(shutdown_rx));
        MonitorTask {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        info!(
            backend = self.inner.backend.name(),
            interval_secs = self.inner.probe_interval.as_secs(),
            "Connectivity monitor started"
        );

        let (event_tx, mut event_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let _subscription = self.inner.backend.subscribe(Arc::new(move |signal: &PlatformSignal| {
            if let Err(e) = event_tx.try_send(signal.clone()) {
                warn!(error = %e, "Dropping connectivity event");
            }
        }));

        let mut ticker = tokio::time::interval(self.inner.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    self.check_connection().await;
                }
                Some(signal) = event_rx.recv() => {
                    let state = NetworkState::from_signal(&signal, Utc::now());
                    debug!(state = %state.status_display(), "Backend pushed connectivity event");
                    self.reconcile(state).await;
                }
            }
        }

        info!("Connectivity monitor stopped");
    }
}

impl Inner {
    async fn reconcile(&self, observed: NetworkState) -> NetworkState {
        let _guard = self.reconcile_lock.lock().await;
        let observed = observed.normalized();

        let current = self.state_tx.borrow().clone();
        if current.same_connectivity(&observed) {
            self.state_tx.send_if_modified(|held| {
                held.last_checked_at = observed.last_checked_at;
                false
            });
            return self.state_tx.borrow().clone();
        }

        info!(
            from = %current.status_display(),
            to = %observed.status_display(),
            "Connectivity changed"
        );
        self.state_tx.send_replace(observed.clone());
        self.persist(&observed).await;
        self.subscribers.emit(&observed);
        observed
    }

    async fn persist(&self, state: &NetworkState) {
        let contents = match serde_json::to_string(state) {
            Ok(contents) => contents,
            Err(e) => {
                error!(error = %e, "Failed to serialize network state");
                return;
            }
        };
        if let Err(e) = self.store.set_item(NETWORK_STATE_KEY, &contents).await {
            warn!(error = %e, "Failed to persist network state");
        }
    }
}

/// Running monitor driver. Dropping it stops the driver; `shutdown` also
/// waits for it to finish.
pub struct MonitorTask {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorTask {
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(error = %e, "Connectivity monitor task failed");
                }
            }
        }
    }
}

impl Drop for MonitorTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
