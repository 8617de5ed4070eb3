//! Configuration management for Postify
//!
//! Configuration is loaded once at process start from a TOML file (if present)
//! and then overlaid with environment variables, so deployments can keep
//! platform secrets in the environment or a `.env` file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub instagram: InstagramConfig,
    pub facebook: FacebookConfig,
    pub whatsapp: WhatsAppConfig,
    pub image_generation: ImageGenerationConfig,
    pub publish: PublishConfig,
    pub scheduling: SchedulingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/postify/postify.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub root: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: "~/.local/share/postify/media".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub session_backend: SessionBackend,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            session_backend: SessionBackend::Database,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    pub api_base: String,
    /// Politeness delay between consecutive requests of one attempt
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://i.instagram.com/api/v1".to_string(),
            min_delay_ms: 1000,
            max_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacebookConfig {
    pub page_id: Option<String>,
    pub access_token: Option<String>,
    pub graph_base: String,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            page_id: None,
            access_token: None,
            graph_base: "https://graph.facebook.com/v19.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub recipient: Option<String>,
    pub graph_base: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            phone_number_id: None,
            recipient: None,
            graph_base: "https://graph.facebook.com/v19.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageGenerationConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
}

impl Default for ImageGenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint:
                "https://api.stability.ai/v1/generation/stable-diffusion-v1-6/text-to-image"
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Upper bound for one platform attempt, e.g. "30s"
    pub timeout: String,
    /// Instagram kill-switch; `false` keeps Instagram publishing disabled
    pub instagram_enabled: bool,
    /// Keep only the newest N result rows per post after each publish
    pub retain_results_per_post: Option<usize>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            timeout: "30s".to_string(),
            instagram_enabled: false,
            retain_results_per_post: None,
        }
    }
}

impl PublishConfig {
    pub fn timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.timeout).map_err(|e| {
            ConfigError::InvalidValue {
                field: "publish.timeout",
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Seconds between queue polls
    pub poll_interval: u64,
    pub default_platforms: Vec<String>,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            poll_interval: 60,
            default_platforms: vec!["telegram".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from the default location, then apply environment overrides
    ///
    /// A missing config file is not an error; built-in defaults are used instead.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Overlay values found through `lookup` (normally the process environment)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TELEGRAM_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = get("CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }
        if let Some(v) = get("FACEBOOK_PAGE_ID") {
            self.facebook.page_id = Some(v);
        }
        if let Some(v) = get("FACEBOOK_ACCESS_TOKEN") {
            self.facebook.access_token = Some(v);
        }
        if let Some(v) = get("WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(v);
        }
        if let Some(v) = get("WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(v);
        }
        if let Some(v) = get("WHATSAPP_RECIPIENT") {
            self.whatsapp.recipient = Some(v);
        }
        if let Some(v) = get("STABILITY_API_KEY") {
            self.image_generation.api_key = Some(v);
        }
        if let Some(v) = get("POSTIFY_DB_PATH") {
            self.database.path = v;
        }
        if let Some(v) = get("POSTIFY_MEDIA_ROOT") {
            self.media.root = v;
        }
        if let Some(v) = get("POSTIFY_HOST") {
            self.server.host = v;
        }
        if let Some(port) = get("POSTIFY_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
    }

    /// Reject values that would only fail later at publish time
    pub fn validate(&self) -> Result<()> {
        self.publish.timeout()?;
        if self.instagram.min_delay_ms > self.instagram.max_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "instagram.min_delay_ms",
                reason: "must not exceed instagram.max_delay_ms".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Database path with `~` expanded
    pub fn database_path(&self) -> String {
        shellexpand::tilde(&self.database.path).to_string()
    }

    /// Media root with `~` expanded
    pub fn media_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.media.root).to_string())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POSTIFY_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("postify").join("config.toml"))
}
