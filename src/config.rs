//! Session handler configuration.

use crate::pump::DEFAULT_READINESS_TIMEOUT;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default bound on waiting for the pump to stop during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for an [`InputHandler`](crate::InputHandler).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HandlerConfig {
    /// Device node, e.g. `/dev/input/event3`.
    pub path: PathBuf,
    /// Bound on one readiness wait.
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_readiness_timeout", with = "millis")
    )]
    pub readiness_timeout: Duration,
    /// Bound on waiting for the pump during shutdown.
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_shutdown_timeout", with = "millis")
    )]
    pub shutdown_timeout: Duration,
    /// Grab the device as soon as the session starts.
    #[cfg_attr(feature = "serde", serde(default))]
    pub grab: bool,
}

impl HandlerConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            grab: false,
        }
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_grab(mut self, grab: bool) -> Self {
        self.grab = grab;
        self
    }

    /// Parse a configuration from JSON. Timeouts are given in milliseconds.
    ///
    /// ```
    /// # #[cfg(feature = "serde")] {
    /// use evsession::HandlerConfig;
    ///
    /// let config = HandlerConfig::from_json(r#"{"path": "/dev/input/event3", "grab": true}"#)
    ///     .unwrap();
    /// assert!(config.grab);
    /// # }
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::Error::Config(e.to_string()))
    }
}

#[cfg(feature = "serde")]
fn default_readiness_timeout() -> Duration {
    DEFAULT_READINESS_TIMEOUT
}

#[cfg(feature = "serde")]
fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}

#[cfg(feature = "serde")]
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
