// Configuration module entry point
// Loads layered configuration and builds the shared runtime state

mod state;
mod types;

use std::net::SocketAddr;

use crate::routing::{RouteTable, RouteTableError};

// Re-export public types
pub use state::AppState;
pub use types::{
    AnalysisConfig, Config, HttpConfig, LoggingConfig, MqttConfig, PerformanceConfig,
    PublisherConfig, ServerConfig, SpaConfig, StorageConfig,
};

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("CONSOLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5173)?
            .set_default("server.api_host", "0.0.0.0")?
            .set_default("server.api_port", 5000)?
            .set_default("server.ws_host", "0.0.0.0")?
            .set_default("server.ws_port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("http.server_name", "sensor-console/0.1")?
            .set_default("http.enable_cors", true)?
            .set_default("http.max_body_size", 1_048_576)? // 1MB
            .set_default("spa.dist_dir", "dist")?
            .set_default("spa.index_file", "index.html")?
            .set_default("spa.history", "web")?
            .set_default("spa.fallback", true)?
            .set_default("mqtt.broker", "127.0.0.1")?
            .set_default("mqtt.port", 1883)?
            .set_default("mqtt.topic", "iot/area1/environment")?
            .set_default("mqtt.client_id", "sensor-console-sub")?
            .set_default("mqtt.keep_alive", 60)?
            .set_default("mqtt.reconnect_delay", 3)?
            .set_default("mqtt.auto_connect", true)?
            .set_default("storage.data_dir", "data")?
            .set_default("storage.csv_file", "sensor_data.csv")?
            .set_default("storage.history_limit", 50)?
            .set_default("analysis.window", 30)?
            .set_default("analysis.smoothing", 5)?
            .set_default("analysis.forecast", 5)?
            .set_default("publisher.data_dir", "data")?
            .set_default("publisher.temperature_file", "temperature.txt")?
            .set_default("publisher.humidity_file", "humidity.txt")?
            .set_default("publisher.pressure_file", "pressure.txt")?
            .set_default("publisher.client_id", "sensor-console-pub")?
            .set_default("publisher.interval_ms", 1000)?
            .set_default("publisher.warmup_ms", 2000)?
            .build()?;

        settings.try_deserialize()
    }

    pub fn web_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    pub fn api_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.api_host, self.server.api_port)
            .parse()
            .map_err(|e| format!("Invalid API address: {e}"))
    }

    pub fn ws_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.ws_host, self.server.ws_port)
            .parse()
            .map_err(|e| format!("Invalid WebSocket address: {e}"))
    }

    /// Route table for the front-end: configured routes or the built-in table
    pub fn route_table(&self) -> Result<RouteTable, RouteTableError> {
        match &self.spa.routes {
            Some(routes) => RouteTable::new(routes.clone(), self.spa.history),
            None => {
                let default = RouteTable::default_table();
                RouteTable::new(default.routes().to_vec(), self.spa.history)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{HistoryMode, Page, Resolution};
    use std::io::Write;

    fn load(content: &str) -> Config {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let path = file.path().to_string_lossy().into_owned();
        Config::load_from(&path).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = load("");
        assert_eq!(cfg.server.port, 5173);
        assert_eq!(cfg.server.api_port, 5000);
        assert_eq!(cfg.server.ws_port, 8080);
        assert_eq!(cfg.mqtt.topic, "iot/area1/environment");
        assert_eq!(cfg.mqtt.port, 1883);
        assert!(cfg.mqtt.username.is_none());
        assert_eq!(cfg.storage.history_limit, 50);
        assert_eq!(cfg.analysis.window, 30);
        assert_eq!(cfg.publisher.interval_ms, 1000);
        assert_eq!(cfg.spa.history, HistoryMode::Web);
        assert!(cfg.spa.fallback);
        assert_eq!(
            cfg.storage.csv_path(),
            std::path::Path::new("data").join("sensor_data.csv")
        );
        assert_eq!(cfg.web_socket_addr().unwrap().port(), 5173);
        assert_eq!(cfg.route_table().unwrap(), RouteTable::default_table());
    }

    #[test]
    fn test_file_overrides() {
        let cfg = load(
            r#"
[server]
api_port = 5001

[mqtt]
broker = "broker.local"
username = "admin"
password = "secret"

[spa]
history = "hash"
routes = [
    { path = "/", type = "redirect", to = "/analyze" },
    { path = "/analyze", type = "page", page = "data_display" },
]
"#,
        );
        assert_eq!(cfg.server.api_port, 5001);
        assert_eq!(cfg.mqtt.broker, "broker.local");
        assert_eq!(cfg.mqtt.password.as_deref(), Some("secret"));

        let table = cfg.route_table().unwrap();
        assert_eq!(table.history(), HistoryMode::Hash);
        assert!(matches!(
            table.resolve("/"),
            Resolution::Page {
                path: "/analyze",
                page: Page::DataDisplay,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_routes_rejected() {
        let cfg = load(
            r#"
[spa]
routes = [
    { path = "/a", type = "page", page = "subscribe" },
    { path = "/a", type = "page", page = "publish" },
]
"#,
        );
        assert!(cfg.route_table().is_err());
    }

    #[test]
    fn test_bad_address() {
        let mut cfg = load("");
        cfg.server.host = "not an ip".to_string();
        assert!(cfg.web_socket_addr().is_err());
    }
}
