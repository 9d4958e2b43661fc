use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub inference: InferenceConfig,
    #[serde(default)]
    pub language: LanguageConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub participants: ParticipantsConfig,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub cookie_name: String,
    /// Seconds a login cookie stays valid.
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_owned(),
            cookie_name: "la_session".to_owned(),
            session_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "json".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub base_model: String,
    pub sft_adapter: String,
    pub dpo_adapter: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_reply_delimiter")]
    pub reply_delimiter: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f64 {
    0.9
}

fn default_top_p() -> f64 {
    0.9
}

fn default_top_k() -> u32 {
    50
}

fn default_reply_delimiter() -> String {
    la_core::core::DEFAULT_REPLY_DELIMITER.to_owned()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    120_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    pub canonical_name: String,
    pub foreign_name: String,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            canonical_name: "中文".to_owned(),
            foreign_name: "英文".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackendConfig,
    pub path: PathBuf,
    pub response_ids: ResponseIdPolicyConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendConfig::default(),
            path: PathBuf::from("user_data"),
            response_ids: ResponseIdPolicyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackendConfig {
    #[default]
    JsonDir,
    Sqlite,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseIdPolicyConfig {
    #[default]
    Lenient,
    Strict,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParticipantsConfig {
    pub anonymous_password: String,
    /// JSON object mapping username to password.
    pub users_file: Option<PathBuf>,
    pub members: Vec<MemberConfig>,
}

impl Default for ParticipantsConfig {
    fn default() -> Self {
        Self {
            anonymous_password: "test_mode".to_owned(),
            users_file: None,
            members: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MemberConfig {
    pub username: String,
    pub password: String,
}
