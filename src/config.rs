use crate::device::Credentials;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Headset identity and account
    pub credentials: Credentials,
    /// Port to listen on
    pub port: u16,
    /// Bind address (0.0.0.0 for LAN, 127.0.0.1 for localhost)
    pub bind_addr: String,
    /// Root directory holding one sub-directory per dataset category
    pub dataset_dir: PathBuf,
    /// Pause between replayed samples
    pub replay_interval: Duration,
    /// WebSocket URL of the device bridge
    pub device_bridge_url: String,
    /// Static files served next to the API, if the directory exists
    pub public_dir: PathBuf,
    /// Outbound events buffered per client before drops start
    pub session_queue_capacity: usize,
}

impl ServerConfig {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Dataset root alone; needs no credentials
    pub fn dataset_dir_from_env() -> PathBuf {
        dotenvy::dotenv().ok();
        Self::dataset_dir_from_lookup(|key| env::var(key).ok())
    }

    pub fn dataset_dir_from_lookup<F>(lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("DATASET_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("dummy-data"))
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let credentials = Credentials {
            device_id: required("DEVICE_ID")?,
            email: required("EMAIL")?,
            password: required("PASSWORD")?,
        };

        let replay_interval_ms: u64 = lookup("REPLAY_INTERVAL_MS")
            .unwrap_or_else(|| "1000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue("REPLAY_INTERVAL_MS must be a number".to_string())
            })?;
        if replay_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "REPLAY_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        let session_queue_capacity: usize = lookup("SESSION_QUEUE_CAPACITY")
            .unwrap_or_else(|| "64".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue("SESSION_QUEUE_CAPACITY must be a number".to_string())
            })?;
        if session_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_QUEUE_CAPACITY must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            credentials,
            port: lookup("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            dataset_dir: Self::dataset_dir_from_lookup(&lookup),
            replay_interval: Duration::from_millis(replay_interval_ms),
            device_bridge_url: lookup("DEVICE_BRIDGE_URL")
                .unwrap_or_else(|| "ws://127.0.0.1:8765".to_string()),
            public_dir: lookup("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            session_queue_capacity,
        })
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
