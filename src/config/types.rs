// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::routing::{HistoryMode, Route};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub spa: SpaConfig,
    pub mqtt: MqttConfig,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub publisher: PublisherConfig,
}

/// Listener addresses: SPA web server, JSON API, live WebSocket feed
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_host: String,
    pub api_port: u16,
    pub ws_host: String,
    pub ws_port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Minimum level written: error, warn, info or debug
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub enable_cors: bool,
    pub max_body_size: u64,
}

/// Single-page application serving
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SpaConfig {
    /// Built front-end bundle
    pub dist_dir: String,
    pub index_file: String,
    pub history: HistoryMode,
    /// Serve the index for paths outside the route table
    pub fallback: bool,
    /// Overrides the built-in route table when present
    #[serde(default)]
    pub routes: Option<Vec<Route>>,
}

/// MQTT broker connection
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub client_id: String,
    /// Seconds
    pub keep_alive: u64,
    /// Seconds between reconnect attempts
    pub reconnect_delay: u64,
    /// Connect the subscriber at startup
    pub auto_connect: bool,
}

/// Received readings persistence
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
    pub csv_file: String,
    /// Rows returned by the history endpoint
    pub history_limit: usize,
}

impl StorageConfig {
    pub fn csv_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.csv_file)
    }
}

/// Trend analysis parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalysisConfig {
    /// Most recent rows plotted
    pub window: usize,
    /// Rolling mean width
    pub smoothing: usize,
    /// Predicted points past the window
    pub forecast: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window: 30,
            smoothing: 5,
            forecast: 5,
        }
    }
}

/// Replay publisher
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PublisherConfig {
    pub data_dir: String,
    pub temperature_file: String,
    pub humidity_file: String,
    pub pressure_file: String,
    pub client_id: String,
    /// Milliseconds between messages
    pub interval_ms: u64,
    /// Milliseconds to wait after connecting
    pub warmup_ms: u64,
}
