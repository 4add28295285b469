//! Configuration module for dida-bridge.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `DIDA_BRIDGE_COOKIE` | No | - | Dida365 session cookie; the engine stays off without it |
//! | `DIDA_BRIDGE_API_URL` | No | `https://api.dida365.com` | Dida365 API base URL |
//! | `DIDA_BRIDGE_JOPLIN_URL` | No | `http://localhost:41184` | Joplin Data API base URL |
//! | `DIDA_BRIDGE_JOPLIN_TOKEN` | With cookie | - | Joplin Data API token |
//! | `DIDA_BRIDGE_DEBOUNCE_MS` | No | 2500 | Quiescence window for edit bursts |
//! | `DIDA_BRIDGE_SWEEP_COOLDOWN_MS` | No | 1000 | Pause after the last sweep page |
//! | `DIDA_BRIDGE_POLL_INTERVAL_SECS` | No | 10 | Change and feed poll interval (>= 1) |
//! | `DIDA_BRIDGE_IGNORE_TAG` | No | `Dida365Ignore` | Notes with this tag are never synced |
//! | `DIDA_BRIDGE_IGNORE_TAG_SCOPE` | No | `first` | `first` checks the first tag only, `all` scans every tag |
//! | `DIDA_BRIDGE_DEBOUNCE_TARGET` | No | `changed` | `changed` syncs the edited note, `selected` the open one |
//!
//! # Example
//!
//! ```no_run
//! use dida_bridge::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! if config.credentials.is_none() {
//!     println!("No Dida365 cookie configured, nothing to do");
//! }
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default Dida365 API base URL.
pub const DEFAULT_API_URL: &str = "https://api.dida365.com";

/// Default Joplin Data API base URL.
pub const DEFAULT_JOPLIN_URL: &str = "http://localhost:41184";

/// Default quiescence window for edit bursts.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2500;

/// Default pause after the last page of a sweep.
pub const DEFAULT_SWEEP_COOLDOWN_MS: u64 = 1000;

/// Default interval between change and feed polls.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default name of the tag that opts a note out of syncing.
pub const DEFAULT_IGNORE_TAG: &str = "Dida365Ignore";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Which tags the ignore check looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IgnoreTagScope {
    /// Only the first tag the host returns.
    #[default]
    FirstTag,
    /// Every tag of the note.
    AllTags,
}

impl FromStr for IgnoreTagScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::FirstTag),
            "all" => Ok(Self::AllTags),
            other => Err(format!("expected 'first' or 'all', got '{other}'")),
        }
    }
}

/// Which note a debounced edit burst syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebounceTarget {
    /// The note that was edited. Bursts are coalesced per note.
    #[default]
    ChangedNote,
    /// Whatever note is open in the host when the window closes. All edits
    /// share one window.
    SelectedNote,
}

impl FromStr for DebounceTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "changed" => Ok(Self::ChangedNote),
            "selected" => Ok(Self::SelectedNote),
            other => Err(format!("expected 'changed' or 'selected', got '{other}'")),
        }
    }
}

/// Settings of the sync engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Tag name that opts a note out of syncing, compared case-insensitively.
    pub ignore_tag: String,
    pub ignore_tag_scope: IgnoreTagScope,
    pub debounce: Duration,
    pub debounce_target: DebounceTarget,
    /// Pause inserted after the last page of a sweep.
    pub sweep_cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ignore_tag: DEFAULT_IGNORE_TAG.to_string(),
            ignore_tag_scope: IgnoreTagScope::default(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            debounce_target: DebounceTarget::default(),
            sweep_cooldown: Duration::from_millis(DEFAULT_SWEEP_COOLDOWN_MS),
        }
    }
}

/// Credentials for both services. Present only when the engine is enabled.
#[derive(Clone)]
pub struct Credentials {
    /// Dida365 session cookie.
    pub cookie: String,
    /// Joplin Data API token.
    pub joplin_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cookie", &"<redacted>")
            .field("joplin_token", &"<redacted>")
            .finish()
    }
}

/// Configuration for dida-bridge.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` when no Dida365 cookie is set; the engine must not start.
    pub credentials: Option<Credentials>,
    pub api_url: String,
    pub joplin_url: String,
    /// Interval between polls of the Joplin change feed and of the remote tasks.
    pub poll_interval: Duration,
    pub engine: EngineConfig,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `DIDA_BRIDGE_COOKIE` is set but `DIDA_BRIDGE_JOPLIN_TOKEN` is not
    /// - a numeric variable is not a valid integer or is out of range
    /// - `DIDA_BRIDGE_IGNORE_TAG_SCOPE` or `DIDA_BRIDGE_DEBOUNCE_TARGET` has an
    ///   unknown value
    pub fn from_env() -> Result<Self, ConfigError> {
        // Optional: DIDA_BRIDGE_COOKIE (empty counts as unset)
        let cookie = env::var("DIDA_BRIDGE_COOKIE")
            .ok()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        // Required with a cookie: DIDA_BRIDGE_JOPLIN_TOKEN
        let credentials = match cookie {
            Some(cookie) => {
                let joplin_token = env::var("DIDA_BRIDGE_JOPLIN_TOKEN")
                    .ok()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| {
                        ConfigError::MissingEnvVar("DIDA_BRIDGE_JOPLIN_TOKEN".to_string())
                    })?;
                Some(Credentials {
                    cookie,
                    joplin_token,
                })
            }
            None => None,
        };

        let api_url = env::var("DIDA_BRIDGE_API_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let joplin_url = env::var("DIDA_BRIDGE_JOPLIN_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_JOPLIN_URL.to_string());

        let debounce_ms = parse_u64("DIDA_BRIDGE_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS, 0)?;
        let cooldown_ms = parse_u64(
            "DIDA_BRIDGE_SWEEP_COOLDOWN_MS",
            DEFAULT_SWEEP_COOLDOWN_MS,
            0,
        )?;
        let poll_secs = parse_u64(
            "DIDA_BRIDGE_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
            1,
        )?;

        let ignore_tag = env::var("DIDA_BRIDGE_IGNORE_TAG")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IGNORE_TAG.to_string());

        let ignore_tag_scope = parse_enum("DIDA_BRIDGE_IGNORE_TAG_SCOPE")?.unwrap_or_default();
        let debounce_target = parse_enum("DIDA_BRIDGE_DEBOUNCE_TARGET")?.unwrap_or_default();

        Ok(Self {
            credentials,
            api_url,
            joplin_url,
            poll_interval: Duration::from_secs(poll_secs),
            engine: EngineConfig {
                ignore_tag,
                ignore_tag_scope,
                debounce: Duration::from_millis(debounce_ms),
                debounce_target,
                sweep_cooldown: Duration::from_millis(cooldown_ms),
            },
        })
    }
}

/// Parses an optional integer variable with a lower bound.
fn parse_u64(key: &str, default: u64, min: u64) -> Result<u64, ConfigError> {
    let Ok(val) = env::var(key) else {
        return Ok(default);
    };

    let parsed = val
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected non-negative integer, got '{val}'"),
        })?;

    if parsed < min {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be at least {min}, got {parsed}"),
        });
    }

    Ok(parsed)
}

/// Parses an optional enumerated variable.
fn parse_enum<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr<Err = String>,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map(Some)
            .map_err(|message| ConfigError::InvalidValue {
                key: key.to_string(),
                message,
            }),
        Err(_) => Ok(None),
    }
}
