use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::de::DeserializeOwned;
use shared::domain::{DetailLevel, Settings};
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "research-chat.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub min_question_chars: usize,
    pub num_sources: u32,
    pub detail_level: DetailLevel,
    /// `None` keeps preferences in memory only.
    pub preferences_database_url: Option<String>,
    pub export_dir: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: client_core::DEFAULT_API_URL.into(),
            request_timeout_secs: client_core::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            min_question_chars: 1,
            num_sources: Settings::default().num_sources,
            detail_level: DetailLevel::default(),
            preferences_database_url: None,
            export_dir: PathBuf::from("."),
        }
    }
}

impl ChatConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            num_sources: self.num_sources,
            detail_level: self.detail_level,
        }
    }
}

/// Layers defaults, the config file, then environment overrides.
///
/// A missing default config file is fine; a missing explicitly requested one
/// is an error, as are malformed TOML and unknown keys. Individual bad values
/// are logged and skipped.
pub fn load_config(explicit_path: Option<&Path>) -> anyhow::Result<ChatConfig> {
    load_config_with(explicit_path, |key| std::env::var(key).ok())
}

pub fn load_config_with(
    explicit_path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ChatConfig> {
    let mut config = ChatConfig {
        preferences_database_url: default_preferences_database_url(&env),
        ..ChatConfig::default()
    };

    let path = explicit_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let table: toml::Table = toml::from_str(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
            apply_file_config(&mut config, table)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
        }
        Err(err) if explicit_path.is_some() => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
        Err(_) => {}
    }

    apply_env_overrides(&mut config, &env);
    Ok(config)
}

fn apply_file_config(config: &mut ChatConfig, table: toml::Table) -> anyhow::Result<()> {
    for (key, value) in table {
        match key.as_str() {
            "api_url" => {
                if let Some(v) = file_value::<String>(&key, value) {
                    config.api_url = v;
                }
            }
            "request_timeout_secs" => {
                if let Some(v) = file_value::<u64>(&key, value) {
                    set_timeout(config, v);
                }
            }
            "min_question_chars" => {
                if let Some(v) = file_value::<usize>(&key, value) {
                    config.min_question_chars = v;
                }
            }
            "num_sources" => {
                if let Some(v) = file_value::<u32>(&key, value) {
                    set_num_sources(config, v);
                }
            }
            "detail_level" => {
                if let Some(v) = file_value::<String>(&key, value) {
                    set_detail_level(config, &v);
                }
            }
            "preferences_db" => {
                if let Some(v) = file_value::<String>(&key, value) {
                    config.preferences_database_url = preferences_url_from_setting(&v);
                }
            }
            "export_dir" => {
                if let Some(v) = file_value::<PathBuf>(&key, value) {
                    config.export_dir = v;
                }
            }
            other => anyhow::bail!("unknown key '{other}'"),
        }
    }
    Ok(())
}

fn file_value<T: DeserializeOwned>(key: &str, value: toml::Value) -> Option<T> {
    match value.try_into::<T>() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(key, %err, "ignoring config file value of the wrong type");
            None
        }
    }
}

fn apply_env_overrides(config: &mut ChatConfig, env: &impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("RESEARCH_API_URL") {
        config.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        config.api_url = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        match v.trim().parse::<u64>() {
            Ok(parsed) => set_timeout(config, parsed),
            Err(_) => warn!(value = %v, "ignoring non-numeric APP__REQUEST_TIMEOUT_SECS"),
        }
    }

    if let Some(v) = env("APP__MIN_QUESTION_CHARS") {
        match v.trim().parse::<usize>() {
            Ok(parsed) => config.min_question_chars = parsed,
            Err(_) => warn!(value = %v, "ignoring non-numeric APP__MIN_QUESTION_CHARS"),
        }
    }

    if let Some(v) = env("APP__NUM_SOURCES") {
        match v.trim().parse::<u32>() {
            Ok(parsed) => set_num_sources(config, parsed),
            Err(_) => warn!(value = %v, "ignoring non-numeric APP__NUM_SOURCES"),
        }
    }

    if let Some(v) = env("APP__DETAIL_LEVEL") {
        set_detail_level(config, &v);
    }

    if let Some(v) = env("APP__PREFERENCES_DB") {
        config.preferences_database_url = preferences_url_from_setting(&v);
    }

    if let Some(v) = env("APP__EXPORT_DIR") {
        config.export_dir = PathBuf::from(v);
    }
}

fn set_timeout(config: &mut ChatConfig, secs: u64) {
    if secs == 0 {
        warn!("request timeout must be positive; keeping {}s", config.request_timeout_secs);
    } else {
        config.request_timeout_secs = secs;
    }
}

fn set_num_sources(config: &mut ChatConfig, num_sources: u32) {
    match config.settings().with_num_sources(num_sources) {
        Ok(settings) => config.num_sources = settings.num_sources,
        Err(err) => warn!(%err, "ignoring configured number of sources"),
    }
}

fn set_detail_level(config: &mut ChatConfig, raw: &str) {
    match raw.parse::<DetailLevel>() {
        Ok(level) => config.detail_level = level,
        Err(err) => warn!(%err, "ignoring configured detail level"),
    }
}

/// `memory` (or an empty value) disables durable preferences; plain paths become sqlite urls.
fn preferences_url_from_setting(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("memory") {
        return None;
    }
    if raw.starts_with("sqlite:") {
        return Some(raw.to_string());
    }
    Some(storage::sqlite_url_for_path(Path::new(raw)))
}

fn default_preferences_database_url(env: &impl Fn(&str) -> Option<String>) -> Option<String> {
    let home = ["HOME", "USERPROFILE"]
        .into_iter()
        .filter_map(|key| env(key))
        .find(|value| !value.trim().is_empty())?;
    let path = PathBuf::from(home)
        .join(".research_chat")
        .join("preferences.db");
    Some(storage::sqlite_url_for_path(&path))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
