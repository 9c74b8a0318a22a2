//! Startup wiring for the data access layer.
//!
//! `DataLayer` is constructed once per process and handed to consumers by
//! reference. It owns the monitor driver, so dropping it (or calling
//! `shutdown`) stops the periodic probe and releases the backend subscription.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::Config;
use crate::connectivity::{
    select_backend, BrowserSignals, ConnectivityMonitor, MonitorTask, Platform,
};
use crate::fetch::FetchOrchestrator;
use crate::storage::{FileStore, KeyValueStore};

pub struct DataLayer {
    pub platform: Platform,
    pub monitor: ConnectivityMonitor,
    pub fetcher: FetchOrchestrator,
    /// Present when the browser polyfill is in use
    pub browser_signals: Option<BrowserSignals>,
    task: Option<MonitorTask>,
}

impl DataLayer {
    /// Open durable storage under the configured directory, pick the backend
    /// for this platform and start monitoring.
    pub async fn start(config: &Config) -> Result<Self> {
        let dir = config
            .storage_dir()
            .context("Failed to resolve storage directory")?;
        let store = FileStore::new(dir.clone())
            .with_context(|| format!("Failed to open storage at {}", dir.display()))?;
        Self::start_with_store(config, Arc::new(store), Arc::new(SystemClock)).await
    }

    pub async fn start_with_store(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let platform = config.platform.unwrap_or_else(Platform::detect);
        let selected =
            select_backend(platform, config).context("Failed to create connectivity backend")?;

        let monitor = ConnectivityMonitor::new(selected.backend, Arc::clone(&store), config).await;
        let task = monitor.start();
        let fetcher = FetchOrchestrator::new(TtlCache::new(store, clock));

        info!(%platform, "Data layer started");
        Ok(Self {
            platform,
            monitor,
            fetcher,
            browser_signals: selected.browser_signals,
            task: Some(task),
        })
    }

    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.shutdown().await;
        }
        info!("Data layer stopped");
    }
}
