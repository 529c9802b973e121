use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{codes, AppError};
use crate::notify::DEFAULT_DOWN_TOPIC;

pub const DEFAULT_DB_PATH: &str = "downwatch.sqlite";
pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com";
pub const DEFAULT_PUSH_TIMEOUT_MS: u64 = 5_000;
pub const MIN_PUSH_TIMEOUT_MS: u64 = 100;
pub const MAX_PUSH_TIMEOUT_MS: u64 = 30_000;

/// Push provider settings. Missing credentials are not a config error; they leave the
/// notification dispatcher unavailable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushConfig {
    pub project_id: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub endpoint: String,
    pub timeout_ms: u64,
    pub topic: String,
}

impl PushConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            access_token: None,
            endpoint: DEFAULT_FCM_ENDPOINT.to_string(),
            timeout_ms: DEFAULT_PUSH_TIMEOUT_MS,
            topic: DEFAULT_DOWN_TOPIC.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownwatchConfig {
    pub db_path: PathBuf,
    pub targets_path: Option<PathBuf>,
    pub principals_path: Option<PathBuf>,
    pub notify_in_background: bool,
    pub push: PushConfig,
}

impl Default for DownwatchConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            targets_path: None,
            principals_path: None,
            notify_in_background: false,
            push: PushConfig::default(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(
            AppError::new(codes::CONFIG_INVALID, format!("{key} must be a boolean"))
                .with_details(format!("{key}={raw}")),
        ),
    }
}

fn parse_timeout_ms(key: &str, raw: &str) -> Result<u64, AppError> {
    let ms: u64 = raw.trim().parse().map_err(|e| {
        AppError::new(codes::CONFIG_INVALID, format!("{key} must be an integer"))
            .with_details(format!("{key}={raw}; err={e}"))
    })?;
    if !(MIN_PUSH_TIMEOUT_MS..=MAX_PUSH_TIMEOUT_MS).contains(&ms) {
        return Err(AppError::new(
            codes::CONFIG_INVALID,
            format!("{key} must be between {MIN_PUSH_TIMEOUT_MS} and {MAX_PUSH_TIMEOUT_MS}"),
        )
        .with_details(format!("{key}={ms}")));
    }
    Ok(ms)
}

impl DownwatchConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset or blank keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| non_empty(lookup(key));
        let defaults = Self::default();

        let notify_in_background = match get("DOWNWATCH_NOTIFY_IN_BACKGROUND") {
            Some(raw) => parse_bool("DOWNWATCH_NOTIFY_IN_BACKGROUND", &raw)?,
            None => defaults.notify_in_background,
        };
        let timeout_ms = match get("FCM_TIMEOUT_MS") {
            Some(raw) => parse_timeout_ms("FCM_TIMEOUT_MS", &raw)?,
            None => defaults.push.timeout_ms,
        };

        Ok(Self {
            db_path: get("DOWNWATCH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            targets_path: get("DOWNWATCH_TARGETS_PATH").map(PathBuf::from),
            principals_path: get("DOWNWATCH_PRINCIPALS_PATH").map(PathBuf::from),
            notify_in_background,
            push: PushConfig {
                project_id: get("FCM_PROJECT_ID"),
                access_token: get("FCM_ACCESS_TOKEN"),
                endpoint: get("FCM_ENDPOINT").unwrap_or(defaults.push.endpoint),
                timeout_ms,
                topic: get("DOWNWATCH_PUSH_TOPIC").unwrap_or(defaults.push.topic),
            },
        })
    }
}
