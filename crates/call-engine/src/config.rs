//! Call engine configuration.
//!
//! Configuration is loaded from environment variables. The presence and
//! transport tokens are opaque credentials for the external collaborators
//! and are redacted in Debug output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default session channel name.
pub const DEFAULT_CHANNEL_NAME: &str = "main";

/// Default participant capacity (soft admission limit).
pub const DEFAULT_MAX_USERS: usize = 4;

/// Default transport reconnect timeout in milliseconds.
pub const DEFAULT_RECONNECT_TIMEOUT_MS: u64 = 20_000;

/// Default speaking-indicator hold window in milliseconds.
pub const DEFAULT_SPEAKING_HOLD_MS: u64 = 500;

/// Default volume level above which a sample counts as speech.
pub const DEFAULT_SPEAKING_VOLUME_THRESHOLD: u32 = 40;

/// Default bounds for the state-announce jitter delay in milliseconds.
pub const DEFAULT_ANNOUNCE_JITTER_MIN_MS: u64 = 50;
pub const DEFAULT_ANNOUNCE_JITTER_MAX_MS: u64 = 200;

/// Default settle delay between subscribing and the first state request,
/// in milliseconds.
pub const DEFAULT_STATE_REQUEST_DELAY_MS: u64 = 500;

/// Default per-channel event queue capacity.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 64;

/// Call engine configuration.
///
/// Loaded from environment variables with sensible defaults. Sensitive
/// fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// Session channel name shared by both subsystems.
    pub channel_name: String,

    /// Soft participant capacity enforced by the join guard.
    pub max_users: usize,

    /// Login token for the presence channel.
    /// Protected by `SecretString` to prevent accidental logging.
    pub presence_token: SecretString,

    /// Join token for the media transport, if the deployment requires one.
    pub transport_token: Option<SecretString>,

    /// How long the transport may sit in Reconnecting before the engine
    /// forces a full leave.
    pub reconnect_timeout: Duration,

    /// Speaking-indicator hold window (hysteresis against flicker).
    pub speaking_hold: Duration,

    /// Volume level above which a sample counts as speech.
    pub speaking_volume_threshold: u32,

    /// Bounds for the randomized state-announce delay.
    pub announce_jitter: (Duration, Duration),

    /// Settle delay between subscribing and the first state request.
    pub state_request_delay: Duration,

    /// Capacity of each channel's drop-oldest event queue.
    pub event_queue_capacity: usize,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("channel_name", &self.channel_name)
            .field("max_users", &self.max_users)
            .field("presence_token", &"[REDACTED]")
            .field(
                "transport_token",
                &self.transport_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("reconnect_timeout", &self.reconnect_timeout)
            .field("speaking_hold", &self.speaking_hold)
            .field("speaking_volume_threshold", &self.speaking_volume_threshold)
            .field("announce_jitter", &self.announce_jitter)
            .field("state_request_delay", &self.state_request_delay)
            .field("event_queue_capacity", &self.event_queue_capacity)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when `CALL_PRESENCE_TOKEN` is missing or a value
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error when `CALL_PRESENCE_TOKEN` is missing or a value
    /// fails validation.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let presence_token = SecretString::from(
            vars.get("CALL_PRESENCE_TOKEN")
                .ok_or_else(|| ConfigError::MissingEnvVar("CALL_PRESENCE_TOKEN".to_string()))?
                .clone(),
        );

        let transport_token = vars
            .get("CALL_TRANSPORT_TOKEN")
            .filter(|t| !t.is_empty())
            .cloned()
            .map(SecretString::from);

        let channel_name = vars
            .get("CALL_CHANNEL_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CHANNEL_NAME.to_string());

        let max_users = vars
            .get("CALL_MAX_USERS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_USERS);

        let reconnect_timeout_ms = vars
            .get("CALL_RECONNECT_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RECONNECT_TIMEOUT_MS);

        let speaking_hold_ms = vars
            .get("CALL_SPEAKING_HOLD_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SPEAKING_HOLD_MS);

        let speaking_volume_threshold = vars
            .get("CALL_SPEAKING_VOLUME_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SPEAKING_VOLUME_THRESHOLD);

        let jitter_min_ms = vars
            .get("CALL_ANNOUNCE_JITTER_MIN_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_ANNOUNCE_JITTER_MIN_MS);

        let jitter_max_ms = vars
            .get("CALL_ANNOUNCE_JITTER_MAX_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_ANNOUNCE_JITTER_MAX_MS);

        let state_request_delay_ms = vars
            .get("CALL_STATE_REQUEST_DELAY_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_STATE_REQUEST_DELAY_MS);

        let event_queue_capacity = vars
            .get("CALL_EVENT_QUEUE_CAPACITY")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_EVENT_QUEUE_CAPACITY);

        if max_users == 0 {
            return Err(ConfigError::InvalidValue(
                "CALL_MAX_USERS must be at least 1".to_string(),
            ));
        }
        if jitter_min_ms > jitter_max_ms {
            return Err(ConfigError::InvalidValue(format!(
                "CALL_ANNOUNCE_JITTER_MIN_MS ({jitter_min_ms}) exceeds CALL_ANNOUNCE_JITTER_MAX_MS ({jitter_max_ms})"
            )));
        }
        if event_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "CALL_EVENT_QUEUE_CAPACITY must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            channel_name,
            max_users,
            presence_token,
            transport_token,
            reconnect_timeout: Duration::from_millis(reconnect_timeout_ms),
            speaking_hold: Duration::from_millis(speaking_hold_ms),
            speaking_volume_threshold,
            announce_jitter: (
                Duration::from_millis(jitter_min_ms),
                Duration::from_millis(jitter_max_ms),
            ),
            state_request_delay: Duration::from_millis(state_request_delay_ms),
            event_queue_capacity,
        })
    }
}
