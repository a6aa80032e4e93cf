//! Application-level configuration loading for session timing and room policy.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_BACK_CONFIG_PATH";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Seconds of 3-2-1 countdown between start and the first question.
    pub countdown_secs: u32,
    /// Seconds the reveal stays up before the next question opens.
    pub review_pause_secs: u64,
    /// Grace window after final results before the room is torn down.
    pub teardown_grace_secs: u64,
    /// Interval of the registry sweep pruning dead rooms.
    pub sweep_interval_secs: u64,
    /// Length of generated room codes.
    pub code_length: usize,
    /// Retry cap for unique room-code generation.
    pub max_code_attempts: u32,
    /// Capacity applied when the host does not choose one.
    pub default_max_participants: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded session configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            review_pause_secs: 3,
            teardown_grace_secs: 30,
            sweep_interval_secs: 60,
            code_length: 6,
            max_code_attempts: 10,
            default_max_participants: 16,
        }
    }
}

/// JSON representation of the configuration file; every field is optional.
#[derive(Debug, Deserialize)]
struct RawConfig {
    countdown_secs: Option<u32>,
    review_pause_secs: Option<u64>,
    teardown_grace_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    code_length: Option<usize>,
    max_code_attempts: Option<u32>,
    default_max_participants: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            countdown_secs: raw.countdown_secs.unwrap_or(defaults.countdown_secs),
            review_pause_secs: raw.review_pause_secs.unwrap_or(defaults.review_pause_secs),
            teardown_grace_secs: raw
                .teardown_grace_secs
                .unwrap_or(defaults.teardown_grace_secs),
            sweep_interval_secs: raw
                .sweep_interval_secs
                .unwrap_or(defaults.sweep_interval_secs),
            code_length: raw.code_length.unwrap_or(defaults.code_length),
            max_code_attempts: raw.max_code_attempts.unwrap_or(defaults.max_code_attempts),
            default_max_participants: raw
                .default_max_participants
                .unwrap_or(defaults.default_max_participants),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
