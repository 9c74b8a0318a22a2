//! Connectivity backend for hosts with an OS network stack.
//!
//! Link state comes from the kernel interface table (`/sys/class/net`), and
//! reachability from a bounded TCP connect to a well-known host. Where the
//! interface table is unavailable, the reachability check alone decides.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, warn};

use super::backend::ConnectivityBackend;
use super::listeners::{Listener, Subscription};
use super::state::{ConnectionType, PlatformSignal, Reachability};
use crate::config::Config;
use crate::error::ProbeError;

const SYSFS_NET: &str = "/sys/class/net";

/// Virtual interfaces that are "up" without saying anything about the uplink.
const VIRTUAL_PREFIXES: &[&str] = &["lo", "veth", "docker", "br-", "virbr"];

/// Preference order when several links are up.
const LINK_PRIORITY: &[ConnectionType] = &[
    ConnectionType::Ethernet,
    ConnectionType::Wifi,
    ConnectionType::Cellular,
    ConnectionType::Bluetooth,
    ConnectionType::Vpn,
    ConnectionType::Other,
];

/// Interfaces currently carrying traffic, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct LinkSnapshot {
    up: Vec<(String, ConnectionType)>,
}

impl LinkSnapshot {
    fn is_connected(&self) -> bool {
        !self.up.is_empty()
    }

    fn primary(&self) -> Option<ConnectionType> {
        LINK_PRIORITY
            .iter()
            .copied()
            .find(|kind| self.up.iter().any(|(_, k)| k == kind))
    }
}

fn classify(name: &str, iface_dir: &Path) -> ConnectionType {
    if iface_dir.join("wireless").exists() || iface_dir.join("phy80211").exists() {
        ConnectionType::Wifi
    } else if name.starts_with("wwan") || name.starts_with("rmnet") {
        ConnectionType::Cellular
    } else if name.starts_with("bnep") {
        ConnectionType::Bluetooth
    } else if ["tun", "tap", "wg", "ppp", "utun"].iter().any(|p| name.starts_with(p)) {
        ConnectionType::Vpn
    } else if name.starts_with("eth") || name.starts_with("en") {
        ConnectionType::Ethernet
    } else {
        ConnectionType::Other
    }
}

/// Read the interface table. `Ok(None)` means the table does not exist on
/// this host.
async fn read_links(root: &Path) -> Result<Option<LinkSnapshot>, ProbeError> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ProbeError::Platform(format!("{}: {}", root.display(), e))),
    };

    let mut snapshot = LinkSnapshot::default();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ProbeError::Platform(e.to_string()))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }

        let dir = entry.path();
        let operstate = match tokio::fs::read_to_string(dir.join("operstate")).await {
            Ok(state) => state.trim().to_ascii_lowercase(),
            Err(e) => {
                debug!(iface = %name, error = %e, "Skipping interface without operstate");
                continue;
            }
        };

        let kind = classify(&name, &dir);
        // Tunnels have no carrier and report "unknown" while passing traffic
        let carrying = operstate == "up" || (operstate == "unknown" && kind == ConnectionType::Vpn);
        if carrying {
            snapshot.up.push((name, kind));
        }
    }

    snapshot.up.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(Some(snapshot))
}

async fn check_reachable(host: &str, limit: Duration) -> Reachability {
    match timeout(limit, TcpStream::connect(host)).await {
        Ok(Ok(_)) => Reachability::Reachable,
        Ok(Err(e)) => {
            debug!(host, error = %e, "Reachability check failed");
            Reachability::Unreachable
        }
        Err(_) => {
            debug!(host, timeout_ms = limit.as_millis() as u64, "Reachability check timed out");
            Reachability::Unreachable
        }
    }
}

struct NativeInner {
    sysfs_root: PathBuf,
    reachability_host: String,
    probe_timeout: Duration,
    watch_interval: Duration,
}

impl NativeInner {
    async fn probe(&self) -> Result<PlatformSignal, ProbeError> {
        let links = timeout(self.probe_timeout, read_links(&self.sysfs_root))
            .await
            .map_err(|_| ProbeError::Timeout(self.probe_timeout.as_millis() as u64))??;

        let signal = match links {
            Some(snapshot) if !snapshot.is_connected() => PlatformSignal::offline(),
            Some(snapshot) => {
                let reachable = check_reachable(&self.reachability_host, self.probe_timeout).await;
                PlatformSignal::new(true, reachable, snapshot.primary())
            }
            None => {
                let reachable = check_reachable(&self.reachability_host, self.probe_timeout).await;
                if reachable == Reachability::Reachable {
                    PlatformSignal::new(true, reachable, Some(ConnectionType::Unknown))
                } else {
                    PlatformSignal::offline()
                }
            }
        };
        Ok(signal)
    }

    /// Sample the link table and push a fully probed state whenever it changes.
    async fn watch_links(self: Arc<Self>, listener: Listener<PlatformSignal>) {
        let mut last = read_links(&self.sysfs_root).await.ok().flatten();
        let mut ticker = tokio::time::interval(self.watch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let current = match read_links(&self.sysfs_root).await {
                Ok(current) => current,
                Err(e) => {
                    debug!(error = %e, "Failed to sample interface table");
                    continue;
                }
            };
            if current == last {
                continue;
            }

            debug!(?current, "Link table changed");
            last = current;
            let signal = match self.probe().await {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(error = %e, "Probe after link change failed");
                    PlatformSignal::offline()
                }
            };
            listener(&signal);
        }
    }
}

pub struct NativeBackend {
    inner: Arc<NativeInner>,
}

impl NativeBackend {
    pub fn new(
        sysfs_root: PathBuf,
        reachability_host: String,
        probe_timeout: Duration,
        watch_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(NativeInner {
                sysfs_root,
                reachability_host,
                probe_timeout,
                watch_interval,
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            PathBuf::from(SYSFS_NET),
            config.reachability_host.clone(),
            config.probe_timeout(),
            config.link_watch_interval(),
        )
    }
}

#[async_trait]
impl ConnectivityBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn probe_once(&self) -> Result<PlatformSignal, ProbeError> {
        self.inner.probe().await
    }

    fn subscribe(&self, on_change: Listener<PlatformSignal>) -> Subscription {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "No async runtime, link changes will not be pushed");
                return Subscription::noop();
            }
        };

        let task = runtime.spawn(Arc::clone(&self.inner).watch_links(on_change));
        Subscription::new(move || task.abort())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use crate::connectivity::state::NetworkState;

    fn add_iface(root: &Path, name: &str, operstate: &str, wireless: bool) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("operstate"), format!("{}\n", operstate)).unwrap();
        if wireless {
            std::fs::create_dir_all(dir.join("wireless")).unwrap();
        }
    }

    fn backend(root: &Path, host: String) -> NativeBackend {
        NativeBackend::new(
            root.to_path_buf(),
            host,
            Duration::from_secs(2),
            Duration::from_millis(20),
        )
    }

    async fn probe(backend: &NativeBackend) -> NetworkState {
        NetworkState::from_signal(&backend.probe_once().await.unwrap(), Utc::now())
    }

    /// An address nothing listens on.
    async fn closed_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn test_ethernet_up_and_reachable() {
        let sysfs = tempfile::tempdir().unwrap();
        add_iface(sysfs.path(), "lo", "unknown", false);
        add_iface(sysfs.path(), "eth0", "up", false);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let signal = backend(sysfs.path(), listener.local_addr().unwrap().to_string())
            .probe_once()
            .await
            .unwrap();

        assert_eq!(signal.is_connected, Some(true));
        assert_eq!(signal.is_internet_reachable, Some(true));
        assert_eq!(signal.connection_type.as_deref(), Some("ethernet"));
    }

    #[tokio::test]
    async fn test_wifi_link_without_internet() {
        let sysfs = tempfile::tempdir().unwrap();
        add_iface(sysfs.path(), "eth0", "down", false);
        add_iface(sysfs.path(), "wlan0", "up", true);

        let state = probe(&backend(sysfs.path(), closed_addr().await)).await;

        assert!(state.is_connected);
        assert_eq!(state.is_internet_reachable, Reachability::Unreachable);
        assert_eq!(state.connection_type, Some(ConnectionType::Wifi));
    }

    #[tokio::test]
    async fn test_all_links_down() {
        let sysfs = tempfile::tempdir().unwrap();
        add_iface(sysfs.path(), "lo", "unknown", false);
        add_iface(sysfs.path(), "eth0", "down", false);
        add_iface(sysfs.path(), "docker0", "up", false);

        let state = probe(&backend(sysfs.path(), closed_addr().await)).await;

        assert!(!state.is_connected);
        assert_eq!(state.is_internet_reachable, Reachability::Unreachable);
        assert_eq!(state.connection_type, Some(ConnectionType::None));
    }

    #[tokio::test]
    async fn test_missing_interface_table_falls_back_to_reachability() {
        let sysfs = tempfile::tempdir().unwrap();
        let missing = sysfs.path().join("no-such-dir");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let state = probe(&backend(&missing, listener.local_addr().unwrap().to_string())).await;
        assert!(state.is_connected);
        assert_eq!(state.connection_type, Some(ConnectionType::Unknown));

        let state = probe(&backend(&missing, closed_addr().await)).await;
        assert!(!state.is_connected);
    }

    #[tokio::test]
    async fn test_reachability_check_gives_up_after_timeout() {
        let sysfs = tempfile::tempdir().unwrap();
        add_iface(sysfs.path(), "eth0", "up", false);
        // TEST-NET-1 is never routed, so the connect either hangs or fails fast
        let backend = NativeBackend::new(
            sysfs.path().to_path_buf(),
            "192.0.2.1:53".to_string(),
            Duration::from_millis(200),
            Duration::from_secs(60),
        );

        let started = std::time::Instant::now();
        let state = probe(&backend).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(state.is_connected);
        assert_eq!(state.is_internet_reachable, Reachability::Unreachable);
        assert_eq!(state.connection_type, Some(ConnectionType::Ethernet));
    }

    #[test]
    fn test_primary_link_priority() {
        let snapshot = LinkSnapshot {
            up: vec![
                ("tun0".to_string(), ConnectionType::Vpn),
                ("wlan0".to_string(), ConnectionType::Wifi),
            ],
        };
        assert_eq!(snapshot.primary(), Some(ConnectionType::Wifi));
        assert_eq!(LinkSnapshot::default().primary(), None);
    }

    #[tokio::test]
    async fn test_link_change_is_pushed() {
        let sysfs = tempfile::tempdir().unwrap();
        add_iface(sysfs.path(), "eth0", "down", false);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend = backend(sysfs.path(), listener.local_addr().unwrap().to_string());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = backend.subscribe(Arc::new(move |signal: &PlatformSignal| {
            let _ = tx.send(signal.clone());
        }));

        // Let the watcher take its baseline sample first
        tokio::time::sleep(Duration::from_millis(60)).await;
        add_iface(sysfs.path(), "eth0", "up", false);

        let pushed = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed.is_connected, Some(true));
        assert_eq!(pushed.connection_type.as_deref(), Some("ethernet"));

        subscription.unsubscribe();
    }
}
