//! Centralized configuration.
//!
//! Every tunable the engine reads from the environment is loaded here, with a
//! default for each so a bare environment still produces a working setup.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::provisioner::RetryPolicy;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterConfig {
    /// Upper bound on a single catalog search (default: 15s)
    pub search_timeout: Duration,
    /// Polling used to find a freshly created playlist (default: 2s x 5)
    pub provisioning: RetryPolicy,
    /// Re-read the destination after writing and check every track landed
    pub verify_writes: bool,
    /// Polling used by write verification (default: 1s x 5)
    pub verification: RetryPolicy,
    /// How long to wait for a manual decision; `None` waits forever (default: 10 minutes)
    pub manual_resolution_timeout: Option<Duration>,
    /// Buffered events per session before slow subscribers start lagging (default: 100)
    pub event_channel_capacity: usize,
    /// Idle time after which a session without a running conversion is dropped (default: 30 minutes)
    pub session_stale_after: Duration,
    /// Description given to playlists the engine creates
    pub playlist_description: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(15),
            provisioning: RetryPolicy::new(Duration::from_secs(2), 5),
            verify_writes: false,
            verification: RetryPolicy::new(Duration::from_secs(1), 5),
            manual_resolution_timeout: Some(Duration::from_secs(600)),
            event_channel_capacity: 100,
            session_stale_after: Duration::from_secs(1800),
            playlist_description: "Converted playlist".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring malformed {}={:?}, using default", key, raw);
            None
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => {
            warn!("Ignoring malformed {}={:?}, using default", key, raw);
            None
        }
    }
}

impl ConverterConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or malformed.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let manual_resolution_timeout = match env_parse::<u64>("MANUAL_RESOLUTION_TIMEOUT_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.manual_resolution_timeout,
        };

        Self {
            search_timeout: env_secs("SEARCH_TIMEOUT_SECS").unwrap_or(defaults.search_timeout),
            provisioning: RetryPolicy::new(
                env_secs("PROVISION_POLL_INTERVAL_SECS").unwrap_or(defaults.provisioning.interval),
                env_parse("PROVISION_MAX_ATTEMPTS").unwrap_or(defaults.provisioning.max_attempts),
            ),
            verify_writes: env_flag("VERIFY_WRITES").unwrap_or(defaults.verify_writes),
            verification: RetryPolicy::new(
                env_secs("VERIFY_INTERVAL_SECS").unwrap_or(defaults.verification.interval),
                env_parse("VERIFY_MAX_ATTEMPTS").unwrap_or(defaults.verification.max_attempts),
            ),
            manual_resolution_timeout,
            event_channel_capacity: env_parse("EVENT_CHANNEL_CAPACITY")
                .unwrap_or(defaults.event_channel_capacity),
            session_stale_after: env_secs("SESSION_STALE_SECS")
                .unwrap_or(defaults.session_stale_after),
            playlist_description: std::env::var("PLAYLIST_DESCRIPTION")
                .unwrap_or(defaults.playlist_description),
        }
    }

    /// Rejects settings that would make the engine stall or never try.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ConvertError;

        if self.provisioning.max_attempts == 0 {
            return Err(ConvertError::Config(
                "provisioning needs at least one attempt".to_string(),
            ));
        }
        if self.verify_writes && self.verification.max_attempts == 0 {
            return Err(ConvertError::Config(
                "write verification needs at least one attempt".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConvertError::Config(
                "event channel capacity must be positive".to_string(),
            ));
        }
        if self.search_timeout.is_zero() {
            return Err(ConvertError::Config(
                "search timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
