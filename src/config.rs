//! Configuration management for StreamChat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ChatError, Result};
use crate::providers::GenerationParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for StreamChat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider settings and the active selection
    pub provider: ProviderConfig,
    /// Generation settings applied to every session
    #[serde(default)]
    pub session: SessionSettings,
    /// Streaming consumer tuning
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Conversation storage
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend family tag used for adapter dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat-completions API
    #[serde(alias = "openai-compatible")]
    OpenAi,
    /// Google Gemini generateContent API
    Gemini,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(ChatError::Config(format!(
                "Unknown provider kind: {}. Must be one of: openai, gemini",
                other
            ))),
        }
    }
}

/// Configuration for one backend
///
/// The engine treats this as an opaque capability descriptor handed in per
/// call; nothing in the core mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSetting {
    /// Unique name used to select this setting
    pub name: String,
    /// Backend family
    pub kind: ProviderKind,
    /// API base URL (e.g. `https://api.openai.com/v1`)
    pub base_url: String,
    /// One or more credentials, rotated round-robin per call
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Optional HTTP/SOCKS proxy URL
    #[serde(default)]
    pub proxy: Option<String>,
    /// Model used when the session does not name one
    #[serde(default)]
    pub default_model: Option<String>,
}

impl ProviderSetting {
    /// Stable key identifying this setting for key rotation
    pub fn rotation_key(&self) -> String {
        format!("{}|{}", self.name, self.base_url)
    }
}

fn default_openai_setting() -> ProviderSetting {
    ProviderSetting {
        name: "openai".to_string(),
        kind: ProviderKind::OpenAi,
        base_url: "https://api.openai.com/v1".to_string(),
        api_keys: Vec::new(),
        proxy: None,
        default_model: Some("gpt-4o-mini".to_string()),
    }
}

fn default_gemini_setting() -> ProviderSetting {
    ProviderSetting {
        name: "gemini".to_string(),
        kind: ProviderKind::Gemini,
        base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        api_keys: Vec::new(),
        proxy: None,
        default_model: Some("gemini-1.5-flash".to_string()),
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the setting in use
    pub active: String,
    /// All configured backends
    #[serde(default)]
    pub settings: Vec<ProviderSetting>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            active: "openai".to_string(),
            settings: vec![default_openai_setting(), default_gemini_setting()],
        }
    }
}

impl ProviderConfig {
    /// Look up a setting by name
    pub fn find(&self, name: &str) -> Option<&ProviderSetting> {
        self.settings.iter().find(|s| s.name == name)
    }

    /// The currently selected setting
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `active` names no setting
    pub fn active_setting(&self) -> Result<&ProviderSetting> {
        self.find(&self.active).ok_or_else(|| {
            ChatError::Config(format!("No provider setting named '{}'", self.active))
        })
    }

    fn active_setting_mut(&mut self) -> Option<&mut ProviderSetting> {
        let active = self.active.clone();
        self.settings.iter_mut().find(|s| s.name == active)
    }
}

/// Generation settings for a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Model override; falls back to the provider's default model
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Output token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Nucleus sampling
    #[serde(default)]
    pub top_p: Option<f32>,
    /// System prompt prepended to every request
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Stream responses (false uses a single non-streaming call)
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_true() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: None,
            system_prompt: None,
            stream: true,
        }
    }
}

impl SessionSettings {
    /// Build uniform generation parameters for a provider setting
    ///
    /// # Errors
    ///
    /// Returns a configuration error if neither the session nor the setting
    /// names a model
    pub fn generation_params(&self, setting: &ProviderSetting) -> Result<GenerationParams> {
        let model = self
            .model
            .clone()
            .or_else(|| setting.default_model.clone())
            .ok_or_else(|| {
                ChatError::Config(format!(
                    "No model configured for provider '{}'",
                    setting.name
                ))
            })?;

        Ok(GenerationParams {
            model,
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            top_p: self.top_p,
            stream: self.stream,
        })
    }
}

/// Streaming consumer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Minimum wall-clock gap between partial persistence writes
    #[serde(default = "default_throttle_interval_ms")]
    pub throttle_interval_ms: u64,
    /// Delay per character when typing mode is on
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,
    /// Reveal deltas character by character
    #[serde(default)]
    pub typing_mode: bool,
    /// Hint shown once per call when typing mode is off
    #[serde(default = "default_slow_hint_text")]
    pub slow_hint_text: String,
}

fn default_throttle_interval_ms() -> u64 {
    500
}

fn default_typing_delay_ms() -> u64 {
    30
}

fn default_slow_hint_text() -> String {
    "This seems slow. Enable typing mode for a smoother stream?".to_string()
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            throttle_interval_ms: default_throttle_interval_ms(),
            typing_delay_ms: default_typing_delay_ms(),
            typing_mode: false,
            slow_hint_text: default_slow_hint_text(),
        }
    }
}

impl StreamingConfig {
    /// Throttle interval as a [`Duration`]
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    /// Typing delay as a [`Duration`]
    pub fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }
}

/// Conversation storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; platform data dir when absent
    #[serde(default)]
    pub db_path: Option<String>,
}

/// Values supplied on the command line that override the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Active provider name
    pub provider: Option<String>,
    /// Model name
    pub model: Option<String>,
    /// Typing mode toggle
    pub typing_mode: Option<bool>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `overrides` - CLI-supplied overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use streamchat::config::{Config, ConfigOverrides};
    ///
    /// let config = Config::load("config/config.yaml", &ConfigOverrides::default()).unwrap();
    /// config.validate().unwrap();
    /// ```
    pub fn load(path: &str, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_overrides(overrides);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatError::Config(format!("Failed to parse config: {}", e)))
    }

    fn apply_env_vars(&mut self) {
        if let Ok(provider) = std::env::var("STREAMCHAT_PROVIDER") {
            self.provider.active = provider;
        }

        if let Ok(keys) = std::env::var("STREAMCHAT_API_KEYS") {
            let keys: Vec<String> = keys
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            match self.provider.active_setting_mut() {
                Some(setting) => setting.api_keys = keys,
                None => tracing::warn!("STREAMCHAT_API_KEYS set but active provider is unknown"),
            }
        }

        if let Ok(base_url) = std::env::var("STREAMCHAT_BASE_URL") {
            if let Some(setting) = self.provider.active_setting_mut() {
                setting.base_url = base_url;
            }
        }

        if let Ok(model) = std::env::var("STREAMCHAT_MODEL") {
            self.session.model = Some(model);
        }

        if let Ok(throttle) = std::env::var("STREAMCHAT_THROTTLE_MS") {
            if let Ok(value) = throttle.parse() {
                self.streaming.throttle_interval_ms = value;
            } else {
                tracing::warn!("Invalid STREAMCHAT_THROTTLE_MS: {}", throttle);
            }
        }

        if let Ok(typing) = std::env::var("STREAMCHAT_TYPING_MS") {
            if let Ok(value) = typing.parse() {
                self.streaming.typing_delay_ms = value;
            } else {
                tracing::warn!("Invalid STREAMCHAT_TYPING_MS: {}", typing);
            }
        }

        if let Ok(mode) = std::env::var("STREAMCHAT_TYPING_MODE") {
            match mode.to_lowercase().as_str() {
                "1" | "true" | "on" => self.streaming.typing_mode = true,
                "0" | "false" | "off" => self.streaming.typing_mode = false,
                _ => tracing::warn!("Invalid STREAMCHAT_TYPING_MODE: {}", mode),
            }
        }

        if let Ok(db_path) = std::env::var("STREAMCHAT_HISTORY_DB") {
            self.storage.db_path = Some(db_path);
        }
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(provider) = &overrides.provider {
            tracing::debug!("Using provider override: {}", provider);
            self.provider.active = provider.clone();
        }
        if let Some(model) = &overrides.model {
            self.session.model = Some(model.clone());
        }
        if let Some(typing) = overrides.typing_mode {
            self.streaming.typing_mode = typing;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let setting = self.provider.active_setting()?;

        if setting.base_url.trim().is_empty() {
            return Err(ChatError::Config(format!(
                "Provider '{}' has an empty base_url",
                setting.name
            )));
        }

        if url::Url::parse(&setting.base_url).is_err() {
            return Err(ChatError::Config(format!(
                "Provider '{}' has an invalid base_url: {}",
                setting.name, setting.base_url
            )));
        }

        if let Some(proxy) = &setting.proxy {
            if url::Url::parse(proxy).is_err() {
                return Err(ChatError::Config(format!("Invalid proxy URL: {}", proxy)));
            }
        }

        if !(0.0..=2.0).contains(&self.session.temperature) {
            return Err(ChatError::Config(
                "session.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if let Some(top_p) = self.session.top_p {
            if top_p <= 0.0 || top_p > 1.0 {
                return Err(ChatError::Config(
                    "session.top_p must be in (0.0, 1.0]".to_string(),
                ));
            }
        }

        if self.session.max_tokens == 0 {
            return Err(ChatError::Config(
                "session.max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.streaming.typing_mode && self.streaming.typing_delay_ms == 0 {
            return Err(ChatError::Config(
                "streaming.typing_delay_ms must be greater than 0 when typing_mode is on"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            session: SessionSettings::default(),
            streaming: StreamingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.active, "openai");
        assert_eq!(config.streaming.throttle_interval_ms, 500);
        assert_eq!(config.streaming.typing_delay_ms, 30);
        assert!(!config.streaming.typing_mode);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_unknown_active_provider() {
        let mut config = Config::default();
        config.provider.active = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_temperature() {
        let mut config = Config::default();
        config.session.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_top_p() {
        let mut config = Config::default();
        config.session.top_p = Some(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_typing_delay_in_typing_mode() {
        let mut config = Config::default();
        config.streaming.typing_mode = true;
        config.streaming.typing_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_proxy() {
        let mut config = Config::default();
        config.provider.settings[0].proxy = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
provider:
  active: local
  settings:
    - name: local
      kind: openai
      base_url: http://localhost:8080/v1
      api_keys: ["k1", "k2"]
      default_model: llama
    - name: g
      kind: gemini
      base_url: https://generativelanguage.googleapis.com/v1beta
streaming:
  throttle_interval_ms: 250
  typing_mode: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let setting = config.provider.active_setting().unwrap();
        assert_eq!(setting.kind, ProviderKind::OpenAi);
        assert_eq!(setting.api_keys.len(), 2);
        assert_eq!(config.streaming.throttle_interval_ms, 250);
        assert_eq!(config.streaming.typing_delay_ms, 30);
        assert!(config.streaming.typing_mode);
        assert_eq!(config.provider.find("g").unwrap().kind, ProviderKind::Gemini);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generation_params_falls_back_to_setting_model() {
        let config = Config::default();
        let setting = config.provider.active_setting().unwrap();
        let params = config.session.generation_params(setting).unwrap();
        assert_eq!(params.model, "gpt-4o-mini");
        assert_eq!(params.max_tokens, Some(2048));
        assert!(params.stream);
    }

    #[test]
    fn test_generation_params_without_any_model_fails() {
        let mut setting = default_openai_setting();
        setting.default_model = None;
        let result = SessionSettings::default().generation_params(&setting);
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("claude".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = Config::load(
            "/nonexistent/streamchat/config.yaml",
            &ConfigOverrides::default(),
        )
        .unwrap();
        assert_eq!(config.provider.settings.len(), 2);
    }

    #[test]
    fn test_overrides_apply_after_file() {
        let overrides = ConfigOverrides {
            provider: Some("gemini".to_string()),
            model: Some("gemini-2.0-flash".to_string()),
            typing_mode: Some(true),
        };
        let config = Config::load("/nonexistent/config.yaml", &overrides).unwrap();
        assert_eq!(config.provider.active, "gemini");
        assert_eq!(config.session.model.as_deref(), Some("gemini-2.0-flash"));
        assert!(config.streaming.typing_mode);
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_sets_keys_on_active_setting() {
        std::env::set_var("STREAMCHAT_API_KEYS", "a, b ,,c");
        std::env::set_var("STREAMCHAT_THROTTLE_MS", "125");
        let mut config = Config::default();
        config.apply_env_vars();
        std::env::remove_var("STREAMCHAT_API_KEYS");
        std::env::remove_var("STREAMCHAT_THROTTLE_MS");

        let setting = config.provider.active_setting().unwrap();
        assert_eq!(setting.api_keys, vec!["a", "b", "c"]);
        assert_eq!(config.streaming.throttle_interval_ms, 125);
        assert!(config.provider.find("gemini").unwrap().api_keys.is_empty());
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_ignores_invalid_numbers() {
        std::env::set_var("STREAMCHAT_TYPING_MS", "fast");
        let mut config = Config::default();
        config.apply_env_vars();
        std::env::remove_var("STREAMCHAT_TYPING_MS");
        assert_eq!(config.streaming.typing_delay_ms, 30);
    }
}
