//! Logger module
//!
//! Provides logging utilities for the console including:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Broker and replay events
//! - Level-filtered error, warning and debug output

mod format;
pub mod writer;

pub use format::AccessLogEntry;
pub use writer::Level;

use crate::config::Config;
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
        Level::from_name(&config.logging.level),
    )
}

fn enabled(level: Level) -> bool {
    writer::get().map_or(level <= Level::Info, |w| w.enabled(level))
}

/// Write to info/access log
fn write_info(message: &str) {
    match writer::get() {
        Some(w) => w.write_info(message),
        None => println!("{message}"),
    }
}

/// Write to error log
fn write_error(message: &str) {
    match writer::get() {
        Some(w) => w.write_error(message),
        None => eprintln!("{message}"),
    }
}

/// Write to access log specifically
fn write_access(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

pub fn log_server_start(web: &SocketAddr, api: &SocketAddr, ws: &SocketAddr, config: &Config) {
    if !enabled(Level::Info) {
        return;
    }
    write_info("======================================");
    write_info("Sensor console started successfully");
    write_info(&format!("Front-end:  http://{web}"));
    write_info(&format!("API:        http://{api}"));
    write_info(&format!("Live feed:  ws://{ws}"));
    write_info(&format!(
        "Broker:     {}:{} (topic '{}')",
        config.mqtt.broker, config.mqtt.port, config.mqtt.topic
    ));
    write_info(&format!("History:    {}", config.spa.history.as_str()));
    write_info(&format!("Log level: {}", config.logging.level));
    if let Some(workers) = config.server.workers {
        write_info(&format!("Worker threads: {workers}"));
    }
    if let Some(ref path) = config.logging.access_log_file {
        write_info(&format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write_info(&format!("Error log: {path}"));
    }
    write_info("======================================\n");
}

pub fn log_listener_bound(name: &str, addr: &SocketAddr) {
    log_info(&format!("[{name}] Listening on {addr}"));
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    log_debug(&format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    log_error(&format!("Failed to serve connection: {err:?}"));
}

pub fn log_error(message: &str) {
    write_error(&format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    if enabled(Level::Warn) {
        write_error(&format!("[WARN] {message}"));
    }
}

pub fn log_info(message: &str) {
    if enabled(Level::Info) {
        write_info(message);
    }
}

pub fn log_debug(message: &str) {
    if enabled(Level::Debug) {
        write_info(&format!("[DEBUG] {message}"));
    }
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write_access(&entry.format(format));
}

pub fn log_api_request(method: &str, path: &str, status: u16) {
    log_debug(&format!("[API] {method} {path} - {status}"));
}

pub fn log_mqtt_connected(topic: &str) {
    log_info(&format!("[MQTT] Connected, subscribed to '{topic}'"));
}

pub fn log_mqtt_disconnected(reason: &str) {
    log_info(&format!("[MQTT] Disconnected: {reason}"));
}

pub fn log_mqtt_reconnecting() {
    log_info("[MQTT] Reconnecting");
}

pub fn log_reading_received(json: &str) {
    log_debug(&format!("[MQTT] Reading: {json}"));
}

pub fn log_publish_started(total: usize) {
    log_info(&format!("[Publish] Replay started, {total} messages queued"));
}

pub fn log_publish_sent(timestamp: &str) {
    log_debug(&format!("[Publish] Sent ts={timestamp}"));
}

pub fn log_publish_stopped() {
    log_info("[Publish] Replay stopped");
}

pub fn log_publish_finished(sent: usize, total: usize) {
    log_info(&format!("[Publish] Replay finished, {sent}/{total} sent"));
}

pub fn log_ws_client_connected(peer_addr: &SocketAddr, clients: usize) {
    log_info(&format!("[WS] Client connected: {peer_addr} ({clients} online)"));
}

pub fn log_ws_client_closed(peer_addr: &SocketAddr, clients: usize) {
    log_info(&format!("[WS] Client closed: {peer_addr} ({clients} online)"));
}

pub fn log_shutdown(signal: &str) {
    log_info(&format!("\n[Shutdown] {signal} received, stopping services"));
}
