//! Application configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;

use manualbot_core::{CacheConfig, RetryConfig};
use thiserror::Error;

use crate::llm::groq::{GroqSettings, DEFAULT_MODEL};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("GROQ_API_KEY is not set")]
    MissingApiKey,

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0}")]
    OutOfRange(String),
}

/// Settings for the chatbot binary
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub groq_api_key: Option<String>,
    pub model_name: String,
    pub search_k: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub enable_cache: bool,
    pub cache_dir: PathBuf,
    pub index_dir: PathBuf,
    pub max_cache_entries: usize,
    pub cache_ttl: Duration,
    pub max_retry_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            model_name: DEFAULT_MODEL.to_string(),
            search_k: 4,
            temperature: 0.3,
            max_tokens: 2048,
            log_level: "info".to_string(),
            log_dir: None,
            enable_cache: true,
            cache_dir: PathBuf::from("./data/cache"),
            index_dir: PathBuf::from("./data/index"),
            max_cache_entries: 1000,
            cache_ttl: Duration::from_secs(86_400),
            max_retry_attempts: 3,
        }
    }
}

impl AppConfig {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; unset or empty variables keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.groq_api_key = get("GROQ_API_KEY");
        if let Some(model) = get("MODEL_NAME") {
            config.model_name = model;
        }
        if let Some(v) = get("SEARCH_K") {
            config.search_k = parse("SEARCH_K", &v)?;
        }
        if let Some(v) = get("TEMPERATURE") {
            config.temperature = parse("TEMPERATURE", &v)?;
        }
        if let Some(v) = get("MAX_TOKENS") {
            config.max_tokens = parse("MAX_TOKENS", &v)?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }
        config.log_dir = get("LOG_DIR").map(PathBuf::from);
        if let Some(v) = get("ENABLE_CACHE") {
            config.enable_cache = parse_bool("ENABLE_CACHE", &v)?;
        }
        if let Some(dir) = get("CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("INDEX_DIR") {
            config.index_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("MAX_CACHE_ENTRIES") {
            config.max_cache_entries = parse("MAX_CACHE_ENTRIES", &v)?;
        }
        if let Some(v) = get("CACHE_TTL_SECONDS") {
            config.cache_ttl = Duration::from_secs(parse("CACHE_TTL_SECONDS", &v)?);
        }
        if let Some(v) = get("MAX_RETRY_ATTEMPTS") {
            config.max_retry_attempts = parse("MAX_RETRY_ATTEMPTS", &v)?;
        }

        Ok(config)
    }

    /// Check the settings needed to answer questions
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groq_api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.search_k == 0 {
            return Err(ConfigError::OutOfRange("SEARCH_K must be greater than 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::OutOfRange(
                "TEMPERATURE must be between 0 and 1".to_string(),
            ));
        }
        self.to_cache_config()
            .validate()
            .map_err(|e| ConfigError::OutOfRange(e.to_string()))?;
        self.to_retry_config()
            .validate()
            .map_err(|e| ConfigError::OutOfRange(e.to_string()))?;
        Ok(())
    }

    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::builder()
            .cache_dir(&self.cache_dir)
            .ttl(self.cache_ttl)
            .max_entries(self.max_cache_entries)
            .build()
    }

    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::default().with_max_attempts(self.max_retry_attempts)
    }

    /// Provider settings; fails when no API key is configured
    pub fn to_groq_settings(&self) -> Result<GroqSettings, ConfigError> {
        let api_key = self.groq_api_key.as_ref().ok_or(ConfigError::MissingApiKey)?;
        let mut settings = GroqSettings::new(api_key.clone()).with_model(self.model_name.clone());
        settings.temperature = self.temperature;
        settings.max_tokens = self.max_tokens;
        Ok(settings)
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub fn log_directive(&self) -> String {
        format!(
            "manualbot={level},manualbot_core={level}",
            level = self.log_level
        )
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}
