use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "CLIPTUI";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ui: UIConfig,
}

/// Mock service behavior: simulated latency, failure rate, and the RNG
/// seed that makes a run reproducible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_latency_min")]
    pub latency_min_ms: u64,
    #[serde(default = "default_latency_max")]
    pub latency_max_ms: u64,
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            latency_min_ms: default_latency_min(),
            latency_max_ms: default_latency_max(),
            failure_rate: default_failure_rate(),
            seed: 0,
            timeout: default_timeout(),
        }
    }
}

fn default_latency_min() -> u64 {
    200
}

fn default_latency_max() -> u64 {
    700
}

fn default_failure_rate() -> f64 {
    0.05
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_settle_window", with = "humantime_serde")]
    pub settle_window: Duration,
    #[serde(default = "default_swipe_min_px")]
    pub swipe_min_px: f64,
    #[serde(default = "default_swipe_max", with = "humantime_serde")]
    pub swipe_max: Duration,
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            settle_window: default_settle_window(),
            swipe_min_px: default_swipe_min_px(),
            swipe_max: default_swipe_max(),
            visibility_threshold: default_visibility_threshold(),
        }
    }
}

fn default_settle_window() -> Duration {
    Duration::from_millis(100)
}

fn default_swipe_min_px() -> f64 {
    50.0
}

fn default_swipe_max() -> Duration {
    Duration::from_millis(300)
}

fn default_visibility_threshold() -> f64 {
    0.8
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_player_command")]
    pub command: String,
    #[serde(default)]
    pub fullscreen: bool,
    #[serde(default = "default_start_muted")]
    pub start_muted: bool,
    /// Headless mode skips spawning the player entirely.
    #[serde(default)]
    pub disabled: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
            fullscreen: false,
            start_muted: default_start_muted(),
            disabled: false,
        }
    }
}

fn default_player_command() -> String {
    "mpv".to_string()
}

fn default_start_muted() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            max_bytes: default_cache_max_bytes(),
        }
    }
}

fn default_cache_path() -> Option<PathBuf> {
    crate::cache::default_path()
}

fn default_cache_max_bytes() -> u64 {
    5 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = apply_env(cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    base.api = other.api;
    base.feed = other.feed;

    if !other.player.command.is_empty() {
        base.player.command = other.player.command;
    }
    base.player.fullscreen = other.player.fullscreen;
    base.player.start_muted = other.player.start_muted;
    base.player.disabled = other.player.disabled;

    if other.cache.path.is_some() {
        base.cache.path = other.cache.path;
    }
    if other.cache.max_bytes != 0 {
        base.cache.max_bytes = other.cache.max_bytes;
    }

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }

    base
}

fn apply_env(mut cfg: Config, prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.latency_min_ms" => {
            if let Ok(parsed) = value.parse() {
                cfg.api.latency_min_ms = parsed;
            }
        }
        "api.latency_max_ms" => {
            if let Ok(parsed) = value.parse() {
                cfg.api.latency_max_ms = parsed;
            }
        }
        "api.failure_rate" => {
            if let Ok(parsed) = value.parse() {
                cfg.api.failure_rate = parsed;
            }
        }
        "api.seed" => {
            if let Ok(parsed) = value.parse() {
                cfg.api.seed = parsed;
            }
        }
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "feed.settle_window" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.settle_window = duration;
            }
        }
        "feed.swipe_min_px" => {
            if let Ok(parsed) = value.parse() {
                cfg.feed.swipe_min_px = parsed;
            }
        }
        "feed.swipe_max" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.swipe_max = duration;
            }
        }
        "feed.visibility_threshold" => {
            if let Ok(parsed) = value.parse() {
                cfg.feed.visibility_threshold = parsed;
            }
        }
        "player.command" => cfg.player.command = value,
        "player.fullscreen" => {
            cfg.player.fullscreen = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "player.start_muted" => {
            cfg.player.start_muted = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "player.disabled" => {
            cfg.player.disabled = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "cache.path" => cfg.cache.path = Some(PathBuf::from(value)),
        "cache.max_bytes" => {
            if let Ok(parsed) = value.parse() {
                cfg.cache.max_bytes = parsed;
            }
        }
        "ui.theme" => cfg.ui.theme = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clip-tui").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("CLIPTUI_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "default");
        assert_eq!(cfg.api.latency_min_ms, 200);
        assert_eq!(cfg.api.latency_max_ms, 700);
        assert!((cfg.api.failure_rate - 0.05).abs() < f64::EPSILON);
        assert_eq!(cfg.feed.settle_window, Duration::from_millis(100));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  failure_rate: 0.0\n  timeout: 2s\nplayer:\n  command: vlc\nui:\n  theme: mono\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("CLIPTUI_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.failure_rate, 0.0);
        assert_eq!(cfg.api.timeout, Duration::from_secs(2));
        assert_eq!(cfg.player.command, "vlc");
        assert_eq!(cfg.ui.theme, "mono");
    }

    #[test]
    fn env_overrides() {
        env::set_var("CLIPTUI_TEST_ENV_UI__THEME", "dracula");
        env::set_var("CLIPTUI_TEST_ENV_API__SEED", "7");
        env::set_var("CLIPTUI_TEST_ENV_FEED__SETTLE_WINDOW", "250ms");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("CLIPTUI_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "dracula");
        assert_eq!(cfg.api.seed, 7);
        assert_eq!(cfg.feed.settle_window, Duration::from_millis(250));
        env::remove_var("CLIPTUI_TEST_ENV_UI__THEME");
        env::remove_var("CLIPTUI_TEST_ENV_API__SEED");
        env::remove_var("CLIPTUI_TEST_ENV_FEED__SETTLE_WINDOW");
    }
}
