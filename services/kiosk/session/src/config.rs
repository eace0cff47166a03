//! Client configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Reconnection backoff parameters
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound for the un-jittered delay
    pub max: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Symmetric jitter as a fraction of the delay (0.0..=1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(30_000),
            multiplier: 1.5,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Check the parameters are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Backoff(format!(
                "multiplier must be a finite value >= 1, got {}",
                self.multiplier
            )));
        }
        if !self.jitter.is_finite() || !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Backoff(format!(
                "jitter must be within 0..=1, got {}",
                self.jitter
            )));
        }
        if self.base > self.max {
            return Err(ConfigError::Backoff(format!(
                "base delay {:?} exceeds max delay {:?}",
                self.base, self.max
            )));
        }
        Ok(())
    }
}

/// Configuration for a kiosk client.
///
/// Immutable for the lifetime of the client; build a new client to change it.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Control server endpoint, e.g. `wss://control.example/ws/display`
    pub endpoint: String,
    /// Device identity, appended to the endpoint as `device_id`
    pub identity: String,
    /// Interval between heartbeats while connected
    pub heartbeat_interval: Duration,
    /// Reconnection backoff
    pub backoff: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000/ws/display".to_string(),
            identity: String::new(),
            heartbeat_interval: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default timings
    pub fn new(endpoint: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            identity: identity.into(),
            ..Self::default()
        }
    }

    /// Check everything a session needs before it can start.
    ///
    /// The endpoint is not checked here: a bad endpoint is a transport
    /// failure and goes through the reconnect path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.trim().is_empty() {
            return Err(ConfigError::MissingIdentity);
        }
        if self
            .identity
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ConfigError::InvalidIdentity(self.identity.clone()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeat);
        }
        self.backoff.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.backoff.base, Duration::from_secs(1));
        assert_eq!(config.backoff.max, Duration::from_secs(30));
        assert_eq!(config.backoff.multiplier, 1.5);
        assert_eq!(config.backoff.jitter, 0.1);
    }

    #[test]
    fn test_identity_validation() {
        assert_eq!(
            ClientConfig::new("ws://host", "").validate(),
            Err(ConfigError::MissingIdentity)
        );
        assert_eq!(
            ClientConfig::new("ws://host", "   ").validate(),
            Err(ConfigError::MissingIdentity)
        );
        assert!(matches!(
            ClientConfig::new("ws://host", "lobby 1").validate(),
            Err(ConfigError::InvalidIdentity(_))
        ));
        assert!(ClientConfig::new("ws://host", "lobby-1").validate().is_ok());
    }

    #[test]
    fn test_endpoint_not_validated() {
        assert!(ClientConfig::new("not a url", "lobby-1").validate().is_ok());
    }

    #[test]
    fn test_backoff_validation() {
        let mut config = ClientConfig::new("ws://host", "lobby-1");
        config.backoff.multiplier = 0.5;
        assert!(matches!(config.validate(), Err(ConfigError::Backoff(_))));

        config.backoff = BackoffConfig {
            jitter: 1.5,
            ..BackoffConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Backoff(_))));

        config.backoff = BackoffConfig {
            base: Duration::from_secs(60),
            ..BackoffConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Backoff(_))));

        config.backoff = BackoffConfig::default();
        config.heartbeat_interval = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::ZeroHeartbeat));
    }
}
