//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Application settings, read from the environment with a `VOCAB_` prefix.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the vocabulary database file.
    pub db_path: PathBuf,
    /// Directory for generated pronunciation MP3s.
    pub audio_dir: PathBuf,
    /// Port for the HTTP API.
    pub port: u16,
    /// Anthropic model used for extraction and theme generation.
    pub model: String,
    /// Anthropic API key.
    pub api_key: Option<SecretString>,
    /// Worker pool size for background tasks.
    pub max_workers: usize,
    /// Tasks older than this are removed by the periodic sweep.
    pub task_max_age: Duration,
    /// AnkiConnect endpoint.
    pub anki_url: String,
    /// Cookie header sent when fetching articles (subscriber content).
    pub article_cookie: Option<String>,
    /// Language being learned (article language, TTS voice).
    pub source_lang: String,
    /// Language translations are written in.
    pub target_lang: String,
    /// Allowed CORS origins for the frontend.
    pub cors_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/vocab.db"),
            audio_dir: PathBuf::from("./audio"),
            port: 8000,
            model: "claude-haiku-4-5-20251001".to_string(),
            api_key: None,
            max_workers: 4,
            task_max_age: Duration::from_secs(24 * 3600),
            anki_url: "http://localhost:8765".to_string(),
            article_cookie: None,
            source_lang: "es".to_string(),
            target_lang: "fr".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match std::env::var("VOCAB_PORT") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "VOCAB_PORT".to_string(),
                message: format!("not a valid port: {v}"),
            })?,
            Err(_) => defaults.port,
        };

        let max_workers = match std::env::var("VOCAB_MAX_WORKERS") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "VOCAB_MAX_WORKERS".to_string(),
                message: format!("not a valid worker count: {v}"),
            })?,
            Err(_) => defaults.max_workers,
        };

        let task_max_age = match std::env::var("VOCAB_TASK_MAX_AGE_HOURS") {
            Ok(v) => {
                let hours: u64 = v.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "VOCAB_TASK_MAX_AGE_HOURS".to_string(),
                    message: format!("not a valid hour count: {v}"),
                })?;
                Duration::from_secs(hours * 3600)
            }
            Err(_) => defaults.task_max_age,
        };

        let cors_origins = match std::env::var("VOCAB_CORS_ORIGINS") {
            Ok(v) => v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.cors_origins,
        };

        Ok(Self {
            db_path: std::env::var("VOCAB_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            audio_dir: std::env::var("VOCAB_AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.audio_dir),
            port,
            model: std::env::var("VOCAB_MODEL").unwrap_or(defaults.model),
            api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .map(SecretString::from),
            max_workers,
            task_max_age,
            anki_url: std::env::var("VOCAB_ANKI_URL").unwrap_or(defaults.anki_url),
            article_cookie: std::env::var("VOCAB_ARTICLE_COOKIE").ok(),
            source_lang: std::env::var("VOCAB_SOURCE_LANG").unwrap_or(defaults.source_lang),
            target_lang: std::env::var("VOCAB_TARGET_LANG").unwrap_or(defaults.target_lang),
            cors_origins,
        })
    }

    /// The API key, or an error naming the missing variable.
    pub fn require_api_key(&self) -> Result<&SecretString, ConfigError> {
        self.api_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".to_string()))
    }
}
