//! MQTT subscriber service
//!
//! Holds at most one broker session. Readings received on the configured
//! topic are appended to the CSV store and fanned out to WebSocket clients.
//! Unexpected connection loss is retried until the user disconnects.

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::hub::Hub;
use super::reading::{ReadingError, SensorReading};
use super::store::{CsvStore, StoreError};
use crate::config::MqttConfig;
use crate::logger;

const CHANNEL_CAPACITY: usize = 16;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Broker session errors
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("Failed to connect to {broker}:{port}: {reason}")]
    Connect {
        broker: String,
        port: u16,
        reason: String,
    },

    #[error("Timed out connecting to {broker}:{port}")]
    Timeout { broker: String, port: u16 },
}

/// Reading ingestion errors
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Reading(#[from] ReadingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Subscriber state reported by the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MqttStatus {
    pub connected: bool,
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub error: Option<String>,
}

struct Session {
    client: AsyncClient,
    task: JoinHandle<()>,
    user_disconnect: Arc<AtomicBool>,
}

/// Everything the event loop task needs
#[derive(Clone)]
struct Ingest {
    store: Arc<CsvStore>,
    hub: Hub,
    status: Arc<Mutex<MqttStatus>>,
    topic: String,
    reconnect_delay: Duration,
}

pub struct SubscriberService {
    config: MqttConfig,
    ingest: Ingest,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl SubscriberService {
    pub fn new(config: MqttConfig, store: Arc<CsvStore>, hub: Hub) -> Self {
        let status = MqttStatus {
            connected: false,
            broker: config.broker.clone(),
            port: config.port,
            topic: config.topic.clone(),
            error: None,
        };
        let ingest = Ingest {
            store,
            hub,
            status: Arc::new(Mutex::new(status)),
            topic: config.topic.clone(),
            reconnect_delay: Duration::from_secs(config.reconnect_delay),
        };
        Self {
            config,
            ingest,
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn status(&self) -> MqttStatus {
        self.ingest.lock_status().clone()
    }

    /// Open a broker session unless one already exists
    pub async fn connect(&self) -> Result<MqttStatus, MqttError> {
        self.connect_within(CONNECT_TIMEOUT).await
    }

    async fn connect_within(&self, limit: Duration) -> Result<MqttStatus, MqttError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(self.status());
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options(&self.config), CHANNEL_CAPACITY);

        // The first poll performs the network connect; surface its failure to the caller
        let first = tokio::time::timeout(limit, eventloop.poll()).await;
        let first = match first {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                let reason = describe_connection_error(&e);
                self.ingest.lock_status().error = Some(reason.clone());
                return Err(MqttError::Connect {
                    broker: self.config.broker.clone(),
                    port: self.config.port,
                    reason,
                });
            }
            Err(_) => {
                self.ingest.lock_status().error = Some("timed out".to_string());
                return Err(MqttError::Timeout {
                    broker: self.config.broker.clone(),
                    port: self.config.port,
                })
            }
        };

        let user_disconnect = Arc::new(AtomicBool::new(false));
        self.ingest.handle_event(&client, first).await;

        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            self.ingest.clone(),
            Arc::clone(&user_disconnect),
        ));

        *session = Some(Session {
            client,
            task,
            user_disconnect,
        });
        Ok(self.status())
    }

    /// Close the session on user request; no reconnect follows
    pub async fn disconnect(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        session.user_disconnect.store(true, Ordering::SeqCst);
        if let Err(e) = session.client.disconnect().await {
            logger::log_warning(&format!("MQTT disconnect request failed: {e}"));
        }

        let mut task = session.task;
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err() {
            task.abort();
        }

        self.ingest.lock_status().connected = false;
        logger::log_mqtt_disconnected("requested by user");
    }

    /// Decode, persist and broadcast one payload
    pub fn ingest(&self, payload: &[u8]) -> Result<SensorReading, IngestError> {
        self.ingest.ingest(payload)
    }
}

impl Ingest {
    fn lock_status(&self) -> std::sync::MutexGuard<'_, MqttStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ingest(&self, payload: &[u8]) -> Result<SensorReading, IngestError> {
        let reading = SensorReading::from_payload(payload)?;
        self.store.append(&reading)?;
        let json = reading.to_json();
        logger::log_reading_received(&json);
        self.hub.broadcast(json);
        Ok(reading)
    }

    async fn handle_event(&self, client: &AsyncClient, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    {
                        let mut status = self.lock_status();
                        status.connected = true;
                        status.error = None;
                    }
                    logger::log_mqtt_connected(&self.topic);
                    if let Err(e) = client.try_subscribe(self.topic.as_str(), QoS::AtMostOnce) {
                        logger::log_error(&format!("MQTT subscribe to '{}' failed: {e}", self.topic));
                    }
                } else {
                    self.lock_status().error = Some(format!("rc={:?}", ack.code));
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                // CSV append blocks; awaiting keeps rows in arrival order
                let ingest = self.clone();
                let payload = publish.payload;
                match tokio::task::spawn_blocking(move || ingest.ingest(&payload)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => logger::log_error(&format!("Message handling failed: {e}")),
                    Err(e) => logger::log_error(&format!("Message handling task failed: {e}")),
                }
            }
            _ => {}
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    ingest: Ingest,
    user_disconnect: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) if user_disconnect.load(Ordering::SeqCst) => {
                break;
            }
            Ok(event) => ingest.handle_event(&client, event).await,
            Err(e) => {
                if user_disconnect.load(Ordering::SeqCst) {
                    break;
                }
                {
                    let mut status = ingest.lock_status();
                    status.connected = false;
                    if let ConnectionError::ConnectionRefused(code) = &e {
                        status.error = Some(format!("rc={code:?}"));
                    }
                }
                logger::log_mqtt_disconnected(&describe_connection_error(&e));
                tokio::time::sleep(ingest.reconnect_delay).await;
                logger::log_mqtt_reconnecting();
            }
        }
    }
}

fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.client_id.as_str(), config.broker.as_str(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive.max(5)));
    if let Some(username) = &config.username {
        options.set_credentials(username.as_str(), config.password.as_deref().unwrap_or_default());
    }
    options
}

fn describe_connection_error(error: &ConnectionError) -> String {
    match error {
        ConnectionError::ConnectionRefused(code) => format!("rc={code:?}"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MqttConfig {
        MqttConfig {
            broker: "127.0.0.1".to_string(),
            port: 1,
            topic: "iot/area1/environment".to_string(),
            username: None,
            password: None,
            client_id: "test-subscriber".to_string(),
            keep_alive: 60,
            reconnect_delay: 3,
            auto_connect: false,
        }
    }

    #[test]
    fn test_initial_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        let service = SubscriberService::new(config(), store, Hub::default());
        assert_eq!(
            service.status(),
            MqttStatus {
                connected: false,
                broker: "127.0.0.1".to_string(),
                port: 1,
                topic: "iot/area1/environment".to_string(),
                error: None,
            }
        );
    }

    #[tokio::test]
    async fn test_ingest_persists_and_broadcasts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        let hub = Hub::default();
        let mut feed = hub.subscribe();
        let service = SubscriberService::new(config(), Arc::clone(&store), hub);

        let reading = service
            .ingest(br#"{"timestamp":"t1","temperature":21.5}"#)
            .unwrap();
        assert_eq!(reading.temperature, Some(21.5));
        assert_eq!(store.history(10).unwrap().len(), 1);

        let message = feed.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(json["timestamp"], "t1");
    }

    #[test]
    fn test_ingest_rejects_bad_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        let service = SubscriberService::new(config(), Arc::clone(&store), Hub::default());
        assert!(matches!(service.ingest(b"{oops"), Err(IngestError::Reading(_))));
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_publish_event_is_stored_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        let hub = Hub::default();
        let mut feed = hub.subscribe();
        let service = SubscriberService::new(config(), Arc::clone(&store), hub);
        let (client, _eventloop) = AsyncClient::new(mqtt_options(&config()), CHANNEL_CAPACITY);

        for (ts, temperature) in [("t1", 20.0), ("t2", 21.0)] {
            let payload = format!(r#"{{"timestamp":"{ts}","temperature":{temperature}}}"#);
            let publish = rumqttc::Publish::new("iot/area1/environment", QoS::AtMostOnce, payload);
            service
                .ingest
                .handle_event(&client, Event::Incoming(Packet::Publish(publish)))
                .await;
        }

        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["timestamp"], "t1");
        assert_eq!(history[1]["timestamp"], "t2");

        let first: serde_json::Value = serde_json::from_str(&feed.recv().await.unwrap()).unwrap();
        assert_eq!(first["temperature"], 20.0);
    }

    #[tokio::test]
    async fn test_publish_event_with_bad_payload_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        let service = SubscriberService::new(config(), Arc::clone(&store), Hub::default());
        let (client, _eventloop) = AsyncClient::new(mqtt_options(&config()), CHANNEL_CAPACITY);

        let publish = rumqttc::Publish::new("iot/area1/environment", QoS::AtMostOnce, "{oops");
        service
            .ingest
            .handle_event(&client, Event::Incoming(Packet::Publish(publish)))
            .await;
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_connect_timeout_reports_error() {
        // Bound but never accepted: the CONNACK never arrives
        let silent = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut cfg = config();
        cfg.port = silent.local_addr().unwrap().port();

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        let service = SubscriberService::new(cfg, store, Hub::default());

        let err = service
            .connect_within(Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, MqttError::Timeout { .. }));
        let status = service.status();
        assert!(!status.connected);
        assert_eq!(status.error.as_deref(), Some("timed out"));
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        let service = SubscriberService::new(config(), store, Hub::default());
        service.disconnect().await;
        assert!(!service.status().connected);
    }

    #[tokio::test]
    async fn test_connect_failure_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("sensor_data.csv")));
        let service = SubscriberService::new(config(), store, Hub::default());
        // Port 1 on loopback refuses connections
        let err = service.connect().await.unwrap_err();
        assert!(matches!(err, MqttError::Connect { .. }));
        let status = service.status();
        assert!(!status.connected);
        assert!(status.error.is_some());
    }
}
