//! Configuration management for the sheetcol services.
//!
//! Configuration lives in `~/.sheetcol/` (override with `SHEETCOL_CONFIG_DIR`):
//! `config.json` plus an optional `secrets.json`, merged by
//! [`crate::config_loader`].
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `BOT_TOKEN` → channels.telegram.bot_token
//! - `RENDER` (any value) → channels.telegram.webhook.enabled = true
//! - `WEBHOOK_URL` → channels.telegram.webhook.url
//! - `PORT` → channels.telegram.webhook.port
//! - `SHEETCOL_BIND_ADDRESS` → network.bind
//! - `SHEETCOL_LOG_LEVEL` → observability.log_level
//! - `SHEETCOL_LOG_FORMAT` → observability.log_format
//!
//! The three webhook variables only adjust a Telegram section that already
//! exists, from the files or from `BOT_TOKEN`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config_loader::load_modular_config;
use crate::error::{Error, Result};

/// Environment variable that relocates the configuration directory.
pub const CONFIG_DIR_ENV: &str = "SHEETCOL_CONFIG_DIR";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }

    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".sheetcol"),
        |dirs| dirs.home_dir().join(".sheetcol"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Network configuration (bind address for the webhook server)
    #[serde(default)]
    pub network: NetworkConfig,

    /// Messaging channels
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Spreadsheet intake limits and output naming
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default directory and apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_dir(&config_dir()).map(|mut config| {
            config.apply_env_overrides();
            config
        })
    }

    /// Load configuration files from a specific directory, without environment overrides.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let value = load_modular_config(dir)?;
        serde_json::from_value(value)
            .map_err(|e| Error::Config(format!("invalid configuration in {}: {e}", dir.display())))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.is_empty()) {
            self.telegram_mut().bot_token = Some(token);
        }

        // Webhook settings only tune a Telegram section that exists; hosts set
        // PORT for every service, including CLI-only ones.
        if let Some(telegram) = self.channels.telegram.as_mut() {
            // Hosted deployments (Render) receive updates over a webhook.
            if lookup("RENDER").is_some() {
                telegram.webhook.enabled = true;
            }
            if let Some(url) = lookup("WEBHOOK_URL").filter(|u| !u.is_empty()) {
                telegram.webhook.url = Some(url);
            }
            if let Some(port) = lookup("PORT") {
                match port.parse() {
                    Ok(p) => telegram.webhook.port = p,
                    Err(_) => tracing::warn!(port = %port, "Ignoring unparsable PORT"),
                }
            }
        }

        if let Some(bind) = lookup("SHEETCOL_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(level) = lookup("SHEETCOL_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("SHEETCOL_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Telegram section, created with defaults when a token arrives from the environment.
    fn telegram_mut(&mut self) -> &mut TelegramConfig {
        self.channels
            .telegram
            .get_or_insert_with(TelegramConfig::default)
    }

    /// Telegram bot token, if Telegram is configured.
    pub fn telegram_bot_token(&self) -> Option<&str> {
        self.channels
            .telegram
            .as_ref()
            .and_then(|t| t.bot_token.as_deref())
    }

    /// Whether the Telegram channel is enabled.
    pub fn telegram_enabled(&self) -> bool {
        self.channels.telegram.as_ref().is_some_and(|t| t.enabled)
    }

    /// Whether the local CLI channel is enabled.
    pub fn cli_enabled(&self) -> bool {
        self.channels.cli.as_ref().is_some_and(|c| c.enabled)
    }
}

// ============================================================================
// Network
// ============================================================================

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address for the webhook server.
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
        }
    }
}

// ============================================================================
// Channels
// ============================================================================

/// Messaging channels configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    /// Telegram bot configuration
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,

    /// Local terminal channel
    #[serde(default)]
    pub cli: Option<CliChannelConfig>,
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bot token, usually kept in `secrets.json` or `BOT_TOKEN`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Usernames or numeric user ids allowed to use the bot. `"*"` allows everyone.
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Long-poll timeout passed to `getUpdates`.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: None,
            allowed_users: default_allowed_users(),
            poll_timeout_secs: default_poll_timeout_secs(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// Telegram webhook configuration.
///
/// The webhook is registered as `<url>/<bot token>` and served on
/// `network.bind:port`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Public base URL Telegram should post updates to.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_webhook_port")]
    pub port: u16,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            port: default_webhook_port(),
        }
    }
}

/// Local CLI channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliChannelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory where result files are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// User id the terminal session is attributed to.
    #[serde(default = "default_cli_user")]
    pub user_id: String,
}

impl Default for CliChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: default_output_dir(),
            user_id: default_cli_user(),
        }
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Spreadsheet intake configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Filename suffixes treated as spreadsheets (case-insensitive).
    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,

    /// Largest upload that will be downloaded and parsed.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Name of the text file sent back on /process.
    #[serde(default = "default_output_filename")]
    pub output_filename: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            accepted_extensions: default_accepted_extensions(),
            max_file_bytes: default_max_file_bytes(),
            output_filename: default_output_filename(),
        }
    }
}

impl ExtractionConfig {
    /// Whether `filename` carries one of the accepted spreadsheet extensions.
    pub fn is_spreadsheet(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.accepted_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".into()
}
fn default_true() -> bool {
    true
}
fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}
fn default_poll_timeout_secs() -> u64 {
    30
}
fn default_webhook_port() -> u16 {
    8443
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_cli_user() -> String {
    "local".into()
}
fn default_accepted_extensions() -> Vec<String> {
    vec![".xlsx".into(), ".xls".into()]
}
fn default_max_file_bytes() -> u64 {
    20 * 1024 * 1024 // Bot API download limit
}
fn default_output_filename() -> String {
    "extracted_data.txt".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Validate;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.bind, "0.0.0.0");
        assert!(config.channels.telegram.is_none());
        assert_eq!(config.extraction.max_file_bytes, 20 * 1024 * 1024);
        assert_eq!(config.extraction.output_filename, "extracted_data.txt");
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_deserialize_partial_telegram_section() {
        let config: Config =
            serde_json::from_str(r#"{"channels": {"telegram": {"bot_token": "t"}}}"#).unwrap();
        let telegram = config.channels.telegram.unwrap();
        assert!(telegram.enabled);
        assert_eq!(telegram.allowed_users, vec!["*"]);
        assert_eq!(telegram.poll_timeout_secs, 30);
        assert!(!telegram.webhook.enabled);
        assert_eq!(telegram.webhook.port, 8443);
    }

    #[test]
    fn test_observability_aliases() {
        let config: Config =
            serde_json::from_str(r#"{"observability": {"level": "debug", "format": "json"}}"#)
                .unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_bot_token_override_creates_telegram_section() {
        let mut config = Config::default();
        config.apply_overrides_from(env(&[("BOT_TOKEN", "123:abc")]));
        assert!(config.telegram_enabled());
        assert_eq!(config.telegram_bot_token(), Some("123:abc"));
    }

    #[test]
    fn test_render_overrides_enable_webhook() {
        let mut config = Config::default();
        config.apply_overrides_from(env(&[
            ("BOT_TOKEN", "123:abc"),
            ("RENDER", "true"),
            ("WEBHOOK_URL", "https://bot.example.com"),
            ("PORT", "10000"),
        ]));
        let webhook = &config.channels.telegram.as_ref().unwrap().webhook;
        assert!(webhook.enabled);
        assert_eq!(webhook.url.as_deref(), Some("https://bot.example.com"));
        assert_eq!(webhook.port, 10000);
    }

    #[test]
    fn test_bad_port_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(env(&[("BOT_TOKEN", "123:abc"), ("PORT", "not-a-port")]));
        assert_eq!(config.channels.telegram.unwrap().webhook.port, 8443);
    }

    #[test]
    fn test_webhook_env_without_telegram_leaves_cli_config_valid() {
        let mut config: Config =
            serde_json::from_str(r#"{"channels": {"cli": {"enabled": true}}}"#).unwrap();
        config.apply_overrides_from(env(&[
            ("PORT", "8080"),
            ("WEBHOOK_URL", "https://bot.example.com"),
            ("RENDER", "true"),
        ]));

        assert!(config.channels.telegram.is_none());
        assert!(!config.telegram_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_webhook_env_tunes_file_telegram_section() {
        let mut config: Config =
            serde_json::from_str(r#"{"channels": {"telegram": {"bot_token": "t"}}}"#).unwrap();
        config.apply_overrides_from(env(&[("PORT", "9000")]));
        assert_eq!(config.channels.telegram.unwrap().webhook.port, 9000);
    }

    #[test]
    fn test_logging_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(env(&[
            ("SHEETCOL_LOG_LEVEL", "trace"),
            ("SHEETCOL_LOG_FORMAT", "json"),
            ("SHEETCOL_BIND_ADDRESS", "127.0.0.1"),
        ]));
        assert_eq!(config.observability.log_level, "trace");
        assert_eq!(config.observability.log_format, "json");
        assert_eq!(config.network.bind, "127.0.0.1");
        assert!(config.channels.telegram.is_none());
    }

    #[test]
    fn test_is_spreadsheet() {
        let extraction = ExtractionConfig::default();
        assert!(extraction.is_spreadsheet("report.xlsx"));
        assert!(extraction.is_spreadsheet("REPORT.XLSX"));
        assert!(extraction.is_spreadsheet("legacy.xls"));
        assert!(!extraction.is_spreadsheet("notes.txt"));
        assert!(!extraction.is_spreadsheet("archive.xlsx.zip"));
    }
}
