//! Sensor console
//!
//! Backend of a three-page environmental sensor dashboard: serves the
//! single-page front-end with its client-side route table, subscribes to an
//! MQTT topic, stores and analyses readings, replays recorded data, and
//! pushes live readings over WebSocket.

pub mod api;
pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod routing;
pub mod server;
pub mod telemetry;
