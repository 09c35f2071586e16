//! Live calm feed from the headset.
//!
//! The device SDK is reached through a bridge that speaks JSON over
//! WebSocket:
//!
//! ```text
//! -> {"type":"login","deviceId":"..","email":"..","password":".."}
//! <- {"type":"loginResult","ok":true}
//! <- {"type":"calm","probability":0.42,"timestamp":1700000000000}
//! ```
//!
//! Reconnection is left to the bridge; when the feed ends the live source
//! simply goes quiet.

use crate::error::DeviceError;
use crate::producer::{Emitter, Producer};
use crate::registry::Broadcaster;
use crate::types::{CalmLevel, Sample, ServerEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

/// Device identity and account used for login
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub device_id: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("device_id", &self.device_id)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One calm reading as reported by the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalmReading {
    pub probability: f64,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl CalmReading {
    pub fn into_sample(self) -> Sample {
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        Sample::live(self.probability, timestamp)
    }
}

/// Upstream live feed
#[async_trait]
pub trait DeviceFeed: Send + Sync {
    /// Authenticate against the device; must succeed before streaming
    async fn login(&self, credentials: &Credentials) -> Result<(), DeviceError>;

    /// Push readings into `sender` until the feed ends or the receiver is dropped
    async fn stream_calm(&self, sender: mpsc::Sender<CalmReading>) -> Result<(), DeviceError>;
}

/// Start forwarding live readings to every session
pub fn subscribe_live(hub: &Broadcaster, device: Arc<dyn DeviceFeed>) -> Producer {
    Producer::spawn(hub, move |emitter| async move {
        let (tx, mut rx) = mpsc::channel::<CalmReading>(64);
        let feed = device.stream_calm(tx);
        tokio::pin!(feed);

        loop {
            tokio::select! {
                _ = emitter.cancelled() => return,
                Some(reading) = rx.recv() => {
                    if !forward(&emitter, reading) {
                        return;
                    }
                }
                result = &mut feed => {
                    while let Ok(reading) = rx.try_recv() {
                        forward(&emitter, reading);
                    }
                    match result {
                        Ok(()) => warn!("Live feed ended"),
                        Err(e) => {
                            error!("Live feed failed: {}", e);
                            emitter.notify(&ServerEvent::error(e.to_string()));
                        }
                    }
                    return;
                }
            }
        }
    })
}

fn forward(emitter: &Emitter, reading: CalmReading) -> bool {
    let sample = reading.into_sample();
    let level = CalmLevel::from_probability(sample.probability);
    info!(
        "[{}] {:.10} {}",
        chrono::Local::now().format("%H:%M:%S"),
        sample.probability,
        level.emoji()
    );
    emitter.publish(&sample)
}

/// Messages exchanged with the device bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeMessage {
    #[serde(rename_all = "camelCase")]
    Login {
        device_id: String,
        email: String,
        password: String,
    },

    LoginResult {
        ok: bool,
        #[serde(default)]
        message: Option<String>,
    },

    Calm {
        probability: f64,
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

type BridgeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn parse_frame(text: &str) -> serde_json::Result<BridgeMessage> {
    serde_json::from_str(text)
}

/// Upper bound on connect plus login with the bridge
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Device feed reached through a WebSocket bridge
pub struct RelayDevice {
    url: String,
    login_timeout: Duration,
    session: Mutex<Option<BridgeStream>>,
}

impl RelayDevice {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            session: Mutex::new(None),
        }
    }

    pub fn with_login_timeout(mut self, login_timeout: Duration) -> Self {
        self.login_timeout = login_timeout;
        self
    }

    async fn handshake(&self, credentials: &Credentials) -> Result<BridgeStream, DeviceError> {
        info!("Connecting to device bridge: {}", self.url);

        let (mut ws, _) = connect_async(&self.url)
            .await
            .map_err(|e| DeviceError::Connection(format!("Connection failed: {}", e)))?;

        let login = BridgeMessage::Login {
            device_id: credentials.device_id.clone(),
            email: credentials.email.clone(),
            password: credentials.password.clone(),
        };
        let json = serde_json::to_string(&login)
            .map_err(|e| DeviceError::Protocol(e.to_string()))?;
        ws.send(Message::Text(json.into()))
            .await
            .map_err(|e| DeviceError::Connection(e.to_string()))?;

        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Text(text)) => match parse_frame(text.as_str()) {
                    Ok(BridgeMessage::LoginResult { ok: true, .. }) => return Ok(ws),
                    Ok(BridgeMessage::LoginResult { ok: false, message }) => {
                        return Err(DeviceError::Authentication(
                            message.unwrap_or_else(|| "login rejected".to_string()),
                        ));
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(DeviceError::Protocol(format!("Invalid JSON: {}", e))),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(DeviceError::Connection(e.to_string())),
            }
        }

        Err(DeviceError::Connection(
            "bridge closed the connection during login".to_string(),
        ))
    }
}

#[async_trait]
impl DeviceFeed for RelayDevice {
    async fn login(&self, credentials: &Credentials) -> Result<(), DeviceError> {
        info!(
            "{} attempting to authenticate to {}",
            credentials.email, credentials.device_id
        );
        let ws = tokio::time::timeout(self.login_timeout, self.handshake(credentials))
            .await
            .map_err(|_| {
                DeviceError::Connection(format!(
                    "Bridge did not answer login within {:?}",
                    self.login_timeout
                ))
            })??;
        *self.session.lock().await = Some(ws);
        info!("Successfully connected to device {}", credentials.device_id);
        Ok(())
    }

    async fn stream_calm(&self, sender: mpsc::Sender<CalmReading>) -> Result<(), DeviceError> {
        let mut ws = self
            .session
            .lock()
            .await
            .take()
            .ok_or_else(|| DeviceError::Connection("not logged in".to_string()))?;

        info!("Waiting for calm data from device...");

        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Text(text)) => match parse_frame(text.as_str()) {
                    Ok(BridgeMessage::Calm {
                        probability,
                        timestamp,
                    }) => {
                        let reading = CalmReading {
                            probability,
                            timestamp,
                        };
                        if sender.send(reading).await.is_err() {
                            return Ok(());
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Ignoring malformed bridge message: {}", e),
                },
                Ok(Message::Close(_)) => {
                    info!("Device bridge closed the stream");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(DeviceError::Connection(e.to_string())),
            }
        }

        Ok(())
    }
}
