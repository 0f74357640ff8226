use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ErrorCode;

/// Minutes in one day; the attribution cookie lifetime is derived from it.
pub const MINUTES_PER_DAY: u64 = 1440;

/// Tracker options. Keys are snake_case in TOML; the camelCase spellings
/// used by host pages are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Overrides the auto-detected cookie domain.
    #[serde(default, alias = "cookieDomain")]
    pub cookie_domain: Option<String>,
    #[serde(default = "default_cookie_expire_days", alias = "cookieExpireDays")]
    pub cookie_expire_days: u32,
    #[serde(default = "default_max_events", alias = "maxEvents")]
    pub max_events: usize,
    /// Clear the event log after a login has been recorded and shipped.
    #[serde(default, alias = "resetOnLogin")]
    pub reset_on_login: bool,
    /// Clear the event log after a signup has been recorded and shipped.
    #[serde(default, alias = "resetOnSignup")]
    pub reset_on_signup: bool,
    #[serde(default = "default_true", alias = "autoTrack")]
    pub auto_track: bool,
    #[serde(default, alias = "trackHashChange")]
    pub track_hash_change: bool,
    #[serde(default = "default_true", alias = "trackHistoryChange")]
    pub track_history_change: bool,
    /// Attribution lifetime in minutes.
    #[serde(default = "default_attribution_expiry", alias = "attributionExpiry")]
    pub attribution_expiry: u64,
    /// Base URL for backend notifications. `None` disables delivery.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Hosts that must be scoped to their full hostname rather than eTLD+1.
    #[serde(default, alias = "externalDomains")]
    pub external_domains: Vec<String>,
    #[serde(default = "default_events_key")]
    pub events_key: String,
    #[serde(default = "default_attribution_cookie")]
    pub attribution_cookie: String,
    #[serde(default = "default_identity_cookie")]
    pub identity_cookie: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cookie_domain: None,
            cookie_expire_days: default_cookie_expire_days(),
            max_events: default_max_events(),
            reset_on_login: false,
            reset_on_signup: false,
            auto_track: default_true(),
            track_hash_change: false,
            track_history_change: default_true(),
            attribution_expiry: default_attribution_expiry(),
            endpoint: None,
            external_domains: Vec::new(),
            events_key: default_events_key(),
            attribution_cookie: default_attribution_cookie(),
            identity_cookie: default_identity_cookie(),
        }
    }
}

/// A config value that is syntactically valid but unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {field} must be at least 1", ErrorCode::ConfigInvalid)]
pub struct ConfigError {
    pub field: &'static str,
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ConfigInvalid
    }
}

impl TrackerConfig {
    /// Reject values that would make the log or cookies unusable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first zero-valued bound.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.max_events == 0 {
            return Err(ConfigError {
                field: "max_events",
            });
        }
        if self.cookie_expire_days == 0 {
            return Err(ConfigError {
                field: "cookie_expire_days",
            });
        }
        if self.attribution_expiry == 0 {
            return Err(ConfigError {
                field: "attribution_expiry",
            });
        }
        Ok(())
    }

    /// Lifetime of the attribution cookie: `max(1, floor(expiry / 1440))` days.
    #[must_use]
    pub fn attribution_cookie_days(&self) -> u32 {
        let days = (self.attribution_expiry / MINUTES_PER_DAY).max(1);
        u32::try_from(days).unwrap_or(u32::MAX)
    }

    /// Attribution lifetime in milliseconds.
    #[must_use]
    pub fn attribution_expiry_ms(&self) -> i64 {
        i64::try_from(self.attribution_expiry.saturating_mul(60_000)).unwrap_or(i64::MAX)
    }
}

/// Load `config.toml` from a touchtrail state directory.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or fails
/// [`TrackerConfig::validate`].
pub fn load_config(state_dir: &Path) -> Result<TrackerConfig> {
    let path = state_dir.join("config.toml");
    if !path.exists() {
        return Ok(TrackerConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<TrackerConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(config)
}

const fn default_true() -> bool {
    true
}

const fn default_cookie_expire_days() -> u32 {
    365
}

const fn default_max_events() -> usize {
    100
}

const fn default_attribution_expiry() -> u64 {
    365 * MINUTES_PER_DAY
}

fn default_events_key() -> String {
    "touchtrail_events".to_string()
}

fn default_attribution_cookie() -> String {
    "touchtrail_attribution".to_string()
}

fn default_identity_cookie() -> String {
    "touchtrail_uuid".to_string()
}
