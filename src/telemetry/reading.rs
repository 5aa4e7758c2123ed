//! Sensor reading types
//!
//! Payloads travelling over the broker: readings received by the subscriber
//! and messages emitted by the replay publisher.

use serde::Serialize;
use serde_json::{Map, Value};

/// Payload decoding errors
#[derive(Debug, thiserror::Error)]
pub enum ReadingError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

/// Environment reading received from the broker
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub timestamp: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    raw: Map<String, Value>,
}

impl SensorReading {
    /// Decode an MQTT payload; known fields are read leniently
    pub fn from_payload(payload: &[u8]) -> Result<Self, ReadingError> {
        match serde_json::from_slice::<Value>(payload)? {
            Value::Object(raw) => Ok(Self::from_object(raw)),
            _ => Err(ReadingError::NotAnObject),
        }
    }

    pub fn from_object(raw: Map<String, Value>) -> Self {
        let timestamp = raw.get("timestamp").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Self {
            timestamp,
            temperature: raw.get("temperature").and_then(as_f64),
            humidity: raw.get("humidity").and_then(as_f64),
            pressure: raw.get("pressure").and_then(as_f64),
            raw,
        }
    }

    /// Full decoded payload, including fields without a dedicated column
    pub const fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Compact JSON of the full payload
    pub fn to_json(&self) -> String {
        Value::Object(self.raw.clone()).to_string()
    }
}

/// Numbers and numeric strings; anything else is not a measurement
pub fn as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

/// Message published by the replay job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayMessage {
    pub timestamp: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub temp_unit: &'static str,
    pub humidity_unit: &'static str,
    pub pressure_unit: &'static str,
}

impl ReplayMessage {
    pub fn new(timestamp: impl Into<String>, temperature: f64, humidity: f64, pressure: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            temperature,
            humidity,
            pressure,
            temp_unit: "C",
            humidity_unit: "RH%",
            pressure_unit: "hPa",
        }
    }
}
