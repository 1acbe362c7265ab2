//! Guard configuration.
//!
//! Every field has a default, so a configuration document only needs to name
//! what it changes:
//!
//! ```
//! use commitment_guard::GuardConfig;
//!
//! let config = GuardConfig::from_json(r#"{
//!     "host_app_id": "com.example.guard",
//!     "host_label": "Guard",
//!     "sticky_millis": 15000
//! }"#).unwrap();
//!
//! assert_eq!(config.sticky_millis, 15_000);
//! assert_eq!(config.rate_limit_capacity, 10);
//! ```

use crate::application::classifier::ClassifierConfig;
use crate::application::limiter::RateLimiterConfig;
use crate::application::sentinel::SentinelConfig;
use crate::domain::heuristics::KeywordRules;
use crate::domain::sticky::DEFAULT_STICKY_MILLIS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Application id of the host; used for the uninstall block and to
    /// ignore the host's own window events
    pub host_app_id: String,
    /// Human-readable host name, protected by the heuristics while a
    /// commitment is active
    pub host_label: String,
    pub rate_limit_bucket_millis: u64,
    pub rate_limit_capacity: u32,
    pub sticky_millis: u64,
    pub min_intervention_interval_millis: u64,
    pub sentinel_interval_millis: u64,
    pub clock_jump_threshold_millis: u64,
    pub alert_cooldown_millis: u64,
    /// Primary state document; in-memory storage when unset
    pub state_path: Option<PathBuf>,
    /// Secondary backup copy; in-memory when unset
    pub backup_path: Option<PathBuf>,
    /// Sealing key file; an ephemeral key when unset
    pub key_path: Option<PathBuf>,
    pub keywords: KeywordRules,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            host_app_id: "com.example.commitmentguard".to_string(),
            host_label: "commitment guard".to_string(),
            rate_limit_bucket_millis: 50,
            rate_limit_capacity: 10,
            sticky_millis: DEFAULT_STICKY_MILLIS,
            min_intervention_interval_millis: 1_000,
            sentinel_interval_millis: 30_000,
            clock_jump_threshold_millis: 120_000,
            alert_cooldown_millis: 5 * 60 * 1_000,
            state_path: None,
            backup_path: None,
            key_path: None,
            keywords: KeywordRules::default(),
        }
    }
}

impl GuardConfig {
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Place the state document, backup copy and key file under `dir`.
    ///
    /// The backup goes into a sibling `cache` directory so clearing the
    /// state directory alone leaves it in place.
    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.state_path = Some(dir.join("state").join("guard.json"));
        self.backup_path = Some(dir.join("cache").join("guard.bak"));
        self.key_path = Some(dir.join("keys").join("guard.key"));
        self
    }

    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            bucket: Duration::from_millis(self.rate_limit_bucket_millis),
            max_events: self.rate_limit_capacity,
        }
    }

    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            rate_limit: self.rate_limiter(),
            sticky_duration: Duration::from_millis(self.sticky_millis),
            host_app_id: self.host_app_id.clone(),
            host_label: self.host_label.clone(),
        }
    }

    pub fn sentinel(&self) -> SentinelConfig {
        SentinelConfig {
            interval: Duration::from_millis(self.sentinel_interval_millis),
            clock_jump_threshold: Duration::from_millis(self.clock_jump_threshold_millis),
            alert_cooldown: Duration::from_millis(self.alert_cooldown_millis),
        }
    }

    pub fn min_intervention_interval(&self) -> Duration {
        Duration::from_millis(self.min_intervention_interval_millis)
    }
}
