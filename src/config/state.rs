// Application state module
// Shared services and cached configuration values

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use super::types::Config;
use crate::routing::{RouteTable, RouteTableError};
use crate::telemetry::{CsvStore, DataProcessor, Hub, PublisherService, SubscriberService};

/// Application state
pub struct AppState {
    pub config: Config,
    /// Front-end route table, fixed for the process lifetime
    pub routes: Arc<RouteTable>,
    pub store: Arc<CsvStore>,
    pub hub: Hub,
    pub subscriber: SubscriberService,
    pub publisher: PublisherService,
    pub processor: DataProcessor,

    // Cached config values for fast access without locks
    pub cached_access_log: Arc<AtomicBool>,

    /// Notified once when the process starts shutting down
    pub shutdown: Arc<Notify>,
    pub shutdown_requested: AtomicBool,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, RouteTableError> {
        let routes = Arc::new(config.route_table()?);
        let store = Arc::new(CsvStore::new(config.storage.csv_path()));
        let hub = Hub::default();

        Ok(Self {
            config: config.clone(),
            routes,
            subscriber: SubscriberService::new(
                config.mqtt.clone(),
                Arc::clone(&store),
                hub.clone(),
            ),
            publisher: PublisherService::new(config.publisher.clone(), config.mqtt.clone()),
            processor: DataProcessor::new(Arc::clone(&store), config.analysis.clone()),
            store,
            hub,
            cached_access_log: Arc::new(AtomicBool::new(config.logging.access_log)),
            shutdown: Arc::new(Notify::new()),
            shutdown_requested: AtomicBool::new(false),
        })
    }

    pub fn access_log_enabled(&self) -> bool {
        self.cached_access_log.load(Ordering::Relaxed)
    }

    /// Wake every accept loop; later waiters return immediately
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub async fn wait_for_shutdown(&self) {
        let notified = self.shutdown.notified();
        if self.shutdown_requested.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}
