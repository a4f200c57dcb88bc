//! Explicit runtime configuration passed to every component at construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::transport::RetryPolicy;

/// Default city name as published by the Sichuan provider.
pub const DEFAULT_CITY: &str = "成都市";
/// Default idempotency state file for broadcast runs.
pub const DEFAULT_STATE_FILE: &str = "chengdu_air_status.json";
/// Default idempotency state file for template push runs.
pub const DEFAULT_PUSH_STATE_FILE: &str = "chengdu_air_push_status.json";

/// Errors raised while assembling or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A credential needed by the selected mode is absent or blank.
    #[error("missing {0}")]
    Missing(&'static str),
    /// The UTC offset is out of range.
    #[error("invalid UTC offset: {0} hours")]
    InvalidOffset(i32),
}

/// Which notification flow a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Single report to the shared push endpoint.
    Broadcast,
    /// Templated message per subscriber.
    Template,
    /// Refresh of the subscriber list.
    SubscriberSync,
}

/// HTTP behaviour shared by every adapter.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            user_agent: String::from(concat!("airbeacon/", env!("CARGO_PKG_VERSION"))),
        }
    }
}

/// Everything a run needs; built once by the binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the air-quality provider.
    pub source_api_base: String,
    /// Base URL of the broadcast push service.
    pub push_base: String,
    /// Shared secret key for the broadcast push service.
    pub push_key: Option<String>,
    /// Base URL of the messaging platform API.
    pub wechat_base: String,
    /// Messaging platform application id.
    pub app_id: Option<String>,
    /// Messaging platform application secret.
    pub app_secret: Option<String>,
    /// Template id used for per-recipient pushes.
    pub template_id: Option<String>,
    /// Base URL of the day-classification service.
    pub calendar_base: String,
    /// City to report on, matched exactly against provider names.
    pub city_name: String,
    /// Idempotency state file for broadcast runs.
    pub state_file: PathBuf,
    /// Idempotency state file for template push runs.
    pub push_state_file: PathBuf,
    /// Subscriber list file.
    pub subscribers_file: PathBuf,
    /// Attribution printed in report footers.
    pub data_source_label: String,
    /// Offset of the local civil time used for "today" and forecast dates.
    pub utc_offset: FixedOffset,
    /// HTTP behaviour.
    pub http: HttpSettings,
}

impl Config {
    /// Translate an hour offset into a [`FixedOffset`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOffset`] outside of -23..=23 hours.
    pub fn offset_from_hours(hours: i32) -> Result<FixedOffset, ConfigError> {
        hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidOffset(hours))
    }

    /// Idempotency state file gating `mode`.
    ///
    /// Broadcast and template runs keep separate fingerprints so one mode
    /// notifying never suppresses the other.
    #[must_use]
    pub fn state_file_for(&self, mode: Mode) -> &Path {
        match mode {
            Mode::Template => &self.push_state_file,
            Mode::Broadcast | Mode::SubscriberSync => &self.state_file,
        }
    }

    /// Check that the credentials needed by `mode` are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming the first absent credential.
    pub fn validate_for(&self, mode: Mode) -> Result<(), ConfigError> {
        let required: Vec<(&'static str, &Option<String>)> = match mode {
            Mode::Broadcast => vec![("push key", &self.push_key)],
            Mode::Template => vec![
                ("app id", &self.app_id),
                ("app secret", &self.app_secret),
                ("template id", &self.template_id),
            ],
            Mode::SubscriberSync => vec![("app id", &self.app_id), ("app secret", &self.app_secret)],
        };

        for (name, value) in required {
            if value.as_deref().is_none_or(|value| value.trim().is_empty()) {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }
}
