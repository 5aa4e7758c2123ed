//! Telemetry module
//!
//! Sensor data pipeline behind the front-end pages:
//! - Subscribe: broker subscription, CSV persistence, live fan-out
//! - Publish: replay of recorded measurements
//! - Analyze: statistics and trends over stored readings

pub mod analysis;
pub mod hub;
pub mod publisher;
pub mod reading;
pub mod store;
pub mod subscriber;

pub use analysis::{AnalysisError, AnalysisReport, DataProcessor};
pub use hub::Hub;
pub use publisher::{ControlError, PublishStatus, PublisherService};
pub use reading::{ReplayMessage, SensorReading};
pub use store::CsvStore;
pub use subscriber::{MqttStatus, SubscriberService};
