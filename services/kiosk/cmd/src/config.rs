//! Configuration handling for the kiosk client.
//!
//! Settings come from the `client:` section of a YAML file, then
//! `KIOSK_*` environment variables, then command-line flags, each layer
//! overriding the previous one.

use anyhow::{Context, Result};
use kiosk_session::{BackoffConfig, ClientConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Kiosk client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct KioskConfig {
    /// Control server endpoint
    pub endpoint: String,
    /// Device identity sent as `device_id`
    pub device_id: String,
    /// Interval between heartbeats
    pub heartbeat_interval: Duration,
    /// Reconnection backoff
    pub backoff: BackoffConfig,
}

impl Default for KioskConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            endpoint: client.endpoint,
            device_id: String::new(),
            heartbeat_interval: client.heartbeat_interval,
            backoff: client.backoff,
        }
    }
}

/// Root of the YAML file
#[derive(Debug, Deserialize)]
struct RootConfig {
    client: Option<ClientSection>,
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    endpoint: Option<String>,
    device_id: Option<String>,
    heartbeat_interval: Option<String>,
    backoff: Option<BackoffSection>,
}

#[derive(Debug, Deserialize)]
struct BackoffSection {
    base: Option<String>,
    max: Option<String>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .with_context(|| format!("invalid duration for {}: {:?}", key, value))
}

impl KioskConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = Self::default();

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    config.apply_root_config(root)?;
                    info!("Loaded configuration from {:?}", path);
                }
                Err(e) => warn!("Failed to parse config file {:?} ({}), using defaults", path, e),
            },
            Err(_) => warn!("Config file {:?} not found, using defaults", path),
        }

        config.apply_environment_overrides();

        info!(
            "Kiosk configuration: endpoint={}, device_id={:?}, heartbeat={:?}",
            config.endpoint, config.device_id, config.heartbeat_interval
        );
        Ok(config)
    }

    fn apply_root_config(&mut self, root: RootConfig) -> Result<()> {
        let Some(client) = root.client else {
            return Ok(());
        };

        if let Some(endpoint) = client.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(device_id) = client.device_id {
            self.device_id = device_id;
        }
        if let Some(heartbeat) = client.heartbeat_interval {
            self.heartbeat_interval = parse_duration("client.heartbeat_interval", &heartbeat)?;
        }
        if let Some(backoff) = client.backoff {
            if let Some(base) = backoff.base {
                self.backoff.base = parse_duration("client.backoff.base", &base)?;
            }
            if let Some(max) = backoff.max {
                self.backoff.max = parse_duration("client.backoff.max", &max)?;
            }
            if let Some(multiplier) = backoff.multiplier {
                self.backoff.multiplier = multiplier;
            }
            if let Some(jitter) = backoff.jitter {
                self.backoff.jitter = jitter;
            }
        }
        Ok(())
    }

    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `KIOSK_*` overrides from `lookup`
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("KIOSK_ENDPOINT") {
            info!("Endpoint overridden by environment: {}", endpoint);
            self.endpoint = endpoint;
        }

        if let Some(device_id) = lookup("KIOSK_DEVICE_ID") {
            info!("Device ID overridden by environment: {}", device_id);
            self.device_id = device_id;
        }

        if let Some(heartbeat) = lookup("KIOSK_HEARTBEAT_INTERVAL") {
            match humantime::parse_duration(&heartbeat) {
                Ok(interval) => {
                    self.heartbeat_interval = interval;
                    info!("Heartbeat interval overridden by environment: {:?}", interval);
                }
                Err(e) => warn!("Ignoring KIOSK_HEARTBEAT_INTERVAL={:?}: {}", heartbeat, e),
            }
        }
    }

    /// Apply command-line flags; `None` leaves a setting alone
    pub fn apply_cli_overrides(
        &mut self,
        endpoint: Option<String>,
        device_id: Option<String>,
        heartbeat_interval: Option<Duration>,
    ) {
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint;
        }
        if let Some(device_id) = device_id {
            self.device_id = device_id;
        }
        if let Some(interval) = heartbeat_interval {
            self.heartbeat_interval = interval;
        }
    }

    /// Core client configuration
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            identity: self.device_id.clone(),
            heartbeat_interval: self.heartbeat_interval,
            backoff: self.backoff.clone(),
        }
    }
}
