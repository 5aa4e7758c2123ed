//! Replay publisher
//!
//! Replays recorded measurements from the temperature, humidity and pressure
//! data files to the broker, one message per interval, until the data runs
//! out or a stop is requested.

use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::reading::{as_f64, ReplayMessage};
use crate::config::{MqttConfig, PublisherConfig};
use crate::logger;

const CHANNEL_CAPACITY: usize = 64;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Replay job errors
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to read {}: {source}", path.display())]
    DataFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to connect to broker: {0}")]
    Connect(String),

    #[error("Publish failed: {0}")]
    Send(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Dataset load task failed: {0}")]
    Task(String),
}

/// Start/stop request rejections
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("already started")]
    AlreadyRunning,

    #[error("not running")]
    NotRunning,
}

/// Replay progress reported by the status endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishStatus {
    pub running: bool,
    pub count: usize,
    pub total: usize,
    pub error: Option<String>,
}

/// Destination of replayed messages
pub trait ReadingSink {
    fn publish(
        &mut self,
        message: &ReplayMessage,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Load one data file: JSON object lines mapping timestamp to value
pub fn load_series(path: &Path) -> Result<BTreeMap<String, f64>, PublishError> {
    let content = std::fs::read_to_string(path).map_err(|source| PublishError::DataFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_series(&content))
}

/// Parse data file content; malformed lines and non-numeric values are skipped
pub fn parse_series(content: &str) -> BTreeMap<String, f64> {
    let mut series = BTreeMap::new();
    for line in content.lines().map(str::trim) {
        if !line.starts_with('{') {
            continue;
        }
        let Ok(serde_json::Value::Object(object)) = serde_json::from_str(line) else {
            continue;
        };
        for (key, value) in &object {
            if let Some(v) = as_f64(value) {
                series.insert(key.clone(), v);
            }
        }
    }
    series
}

/// Messages for every timestamp present in all three series, in order
pub fn build_messages(
    temperature: &BTreeMap<String, f64>,
    humidity: &BTreeMap<String, f64>,
    pressure: &BTreeMap<String, f64>,
) -> Vec<ReplayMessage> {
    temperature
        .iter()
        .filter_map(|(ts, t)| {
            let h = humidity.get(ts)?;
            let p = pressure.get(ts)?;
            Some(ReplayMessage::new(ts.clone(), *t, *h, *p))
        })
        .collect()
}

/// Load the replay dataset described by the configuration
pub fn load_dataset(config: &PublisherConfig) -> Result<Vec<ReplayMessage>, PublishError> {
    let dir = Path::new(&config.data_dir);
    let temperature = load_series(&dir.join(&config.temperature_file))?;
    let humidity = load_series(&dir.join(&config.humidity_file))?;
    let pressure = load_series(&dir.join(&config.pressure_file))?;
    Ok(build_messages(&temperature, &humidity, &pressure))
}

/// Publish messages in order, honouring the stop flag before each one
pub async fn run_replay<S: ReadingSink>(
    sink: &mut S,
    messages: &[ReplayMessage],
    status: &Mutex<PublishStatus>,
    stop: &AtomicBool,
    interval: Duration,
) -> usize {
    let mut sent = 0;
    for message in messages {
        if stop.load(Ordering::SeqCst) {
            logger::log_publish_stopped();
            break;
        }

        match sink.publish(message).await {
            Ok(()) => {
                sent += 1;
                status.lock().unwrap_or_else(PoisonError::into_inner).count += 1;
                logger::log_publish_sent(&message.timestamp);
            }
            Err(e) => {
                status.lock().unwrap_or_else(PoisonError::into_inner).error =
                    Some(format!("send failed, ts={}", message.timestamp));
                logger::log_error(&format!("Replay {e}"));
            }
        }

        tokio::time::sleep(interval).await;
    }
    sent
}

/// Broker-backed sink with its own event loop task
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
    task: JoinHandle<()>,
}

impl MqttSink {
    pub async fn connect(mqtt: &MqttConfig, client_id: &str) -> Result<Self, PublishError> {
        let mut options = MqttOptions::new(client_id, mqtt.broker.as_str(), mqtt.port);
        options.set_keep_alive(Duration::from_secs(mqtt.keep_alive.max(5)));
        if let Some(username) = &mqtt.username {
            options.set_credentials(username.as_str(), mqtt.password.as_deref().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);
        match tokio::time::timeout(CONNECT_TIMEOUT, eventloop.poll()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(PublishError::Connect(e.to_string())),
            Err(_) => return Err(PublishError::Connect("timed out".to_string())),
        }
        logger::log_info(&format!(
            "[Publish] Connected to {}:{}",
            mqtt.broker, mqtt.port
        ));

        let task = tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    logger::log_debug(&format!("[Publish] Event loop ended: {e}"));
                    break;
                }
            }
        });

        Ok(Self {
            client,
            topic: mqtt.topic.clone(),
            task,
        })
    }

    pub async fn close(self) {
        if let Err(e) = self.client.disconnect().await {
            logger::log_warning(&format!("[Publish] Disconnect failed: {e}"));
        }
        let mut task = self.task;
        if tokio::time::timeout(Duration::from_secs(2), &mut task)
            .await
            .is_err()
        {
            task.abort();
        }
    }
}

impl ReadingSink for MqttSink {
    fn publish(
        &mut self,
        message: &ReplayMessage,
    ) -> impl Future<Output = Result<(), PublishError>> + Send {
        let payload = serde_json::to_vec(message);
        let client = self.client.clone();
        let topic = self.topic.clone();
        async move {
            client
                .publish(topic, QoS::AtMostOnce, false, payload?)
                .await
                .map_err(|e| PublishError::Send(e.to_string()))
        }
    }
}

/// Owns the single replay job
pub struct PublisherService {
    config: PublisherConfig,
    mqtt: MqttConfig,
    status: Arc<Mutex<PublishStatus>>,
    stop: Arc<AtomicBool>,
    job: Mutex<Option<JoinHandle<()>>>,
}

impl PublisherService {
    pub fn new(config: PublisherConfig, mqtt: MqttConfig) -> Self {
        Self {
            config,
            mqtt,
            status: Arc::new(Mutex::new(PublishStatus::default())),
            stop: Arc::new(AtomicBool::new(false)),
            job: Mutex::new(None),
        }
    }

    pub fn status(&self) -> PublishStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start the replay job in the background
    pub fn start(&self) -> Result<(), ControlError> {
        {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            if status.running {
                return Err(ControlError::AlreadyRunning);
            }
            *status = PublishStatus {
                running: true,
                ..PublishStatus::default()
            };
        }
        self.stop.store(false, Ordering::SeqCst);

        let handle = tokio::spawn(replay_job(
            self.config.clone(),
            self.mqtt.clone(),
            Arc::clone(&self.status),
            Arc::clone(&self.stop),
        ));
        *self.job.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Ask the running job to stop before its next message
    pub fn stop(&self) -> Result<(), ControlError> {
        if !self.status().running {
            return Err(ControlError::NotRunning);
        }
        self.stop.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop and wait for the job, used on shutdown
    pub async fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let job = self.job.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut job) = job {
            if tokio::time::timeout(Duration::from_secs(5), &mut job)
                .await
                .is_err()
            {
                job.abort();
            }
        }
    }
}

async fn replay_job(
    config: PublisherConfig,
    mqtt: MqttConfig,
    status: Arc<Mutex<PublishStatus>>,
    stop: Arc<AtomicBool>,
) {
    if let Err(e) = replay(&config, &mqtt, &status, &stop).await {
        logger::log_error(&format!("Replay job failed: {e}"));
        status.lock().unwrap_or_else(PoisonError::into_inner).error = Some(e.to_string());
    }
    status.lock().unwrap_or_else(PoisonError::into_inner).running = false;
}

async fn replay(
    config: &PublisherConfig,
    mqtt: &MqttConfig,
    status: &Mutex<PublishStatus>,
    stop: &AtomicBool,
) -> Result<(), PublishError> {
    let dataset = config.clone();
    let messages = tokio::task::spawn_blocking(move || load_dataset(&dataset))
        .await
        .map_err(|e| PublishError::Task(e.to_string()))??;
    status.lock().unwrap_or_else(PoisonError::into_inner).total = messages.len();
    logger::log_publish_started(messages.len());

    let mut sink = MqttSink::connect(mqtt, &config.client_id).await?;
    tokio::time::sleep(Duration::from_millis(config.warmup_ms)).await;

    let sent = run_replay(
        &mut sink,
        &messages,
        status,
        stop,
        Duration::from_millis(config.interval_ms),
    )
    .await;

    sink.close().await;
    logger::log_publish_finished(sent, messages.len());
    Ok(())
}
