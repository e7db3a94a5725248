use crate::delivery::DEFAULT_DESTINATION;
use crate::recovery::FileStateStore;
use crate::snapshot::DEFAULT_FINGERPRINT_PREFIX;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScribeConfig {
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Pause on stop so events already on the wire can arrive.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Pause after (re-)installing the observer.
    #[serde(default = "default_observer_init_delay_ms")]
    pub observer_init_delay_ms: u64,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_fingerprint_prefix")]
    pub fingerprint_prefix: usize,
}

impl RecorderConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn observer_init_delay(&self) -> Duration {
        Duration::from_millis(self.observer_init_delay_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            observer_init_delay_ms: default_observer_init_delay_ms(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            fingerprint_prefix: default_fingerprint_prefix(),
        }
    }
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_observer_init_delay_ms() -> u64 {
    100
}

fn default_keepalive_interval_secs() -> u64 {
    20
}

fn default_fingerprint_prefix() -> usize {
    DEFAULT_FINGERPRINT_PREFIX
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_destination")]
    pub default_destination: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_destination: default_destination(),
        }
    }
}

fn default_destination() -> String {
    DEFAULT_DESTINATION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

fn default_port() -> u16 {
    9001
}

fn default_call_timeout_ms() -> u64 {
    10000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StateConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(FileStateStore::default_path)
    }
}
