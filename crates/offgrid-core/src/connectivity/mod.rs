//! Connectivity tracking.
//!
//! This module provides:
//! - `NetworkState`: the value type every consumer sees
//! - `ConnectivityBackend`: the platform capability, with a native
//!   implementation and a browser polyfill, chosen once by `select_backend`
//! - `ConnectivityMonitor`: the long-lived service that probes, persists and
//!   broadcasts connectivity changes

pub mod backend;
pub mod browser;
pub mod listeners;
pub mod monitor;
pub mod native;
pub mod state;

pub use backend::{select_backend, ConnectivityBackend, Platform, SelectedBackend};
pub use browser::{BrowserBackend, BrowserEvent, BrowserSignals};
pub use listeners::{Listener, ListenerSet, Subscription};
pub use monitor::{ConnectivityMonitor, MonitorTask};
pub use native::NativeBackend;
pub use state::{ConnectionType, NetworkState, PlatformSignal, Reachability};
