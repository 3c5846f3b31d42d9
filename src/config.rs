use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub embedding_model: String,
    pub file_search_enabled: bool,
    pub file_search_model: String,
    pub file_search_store_prefix: String,
    pub file_search_poll_ms: u64,
    pub file_search_max_wait_ms: u64,
    pub uploads_dir: String,
    pub queue_workers: usize,
    pub queue_max_attempts: i32,
    pub queue_backoff_base_ms: u64,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let gemini_api_key = env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());
        if gemini_api_key.is_none() {
            tracing::warn!(
                "GEMINI_API_KEY is not set; grading, OCR and embeddings run in offline fallback mode"
            );
        }

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            gemini_api_key,
            gemini_model: get_env_or("GEMINI_MODEL", "gemini-pro"),
            embedding_model: get_env_or("GEMINI_EMBEDDING_MODEL", "text-embedding-004"),
            file_search_enabled: get_env_or("GEMINI_FILE_SEARCH_ENABLED", "false")
                .eq_ignore_ascii_case("true"),
            file_search_model: get_env_or("GEMINI_FILE_SEARCH_MODEL", "gemini-pro"),
            file_search_store_prefix: get_env_or("GEMINI_FILE_SEARCH_STORE_PREFIX", "course-"),
            file_search_poll_ms: get_env_parse_or("GEMINI_FILE_SEARCH_POLL_MS", 2_000)?,
            file_search_max_wait_ms: get_env_parse_or("GEMINI_FILE_SEARCH_MAX_WAIT_MS", 60_000)?,
            uploads_dir: get_env_or("UPLOADS_DIR", "uploads"),
            queue_workers: get_env_parse_or("QUEUE_WORKERS", 2)?,
            queue_max_attempts: get_env_parse_or("QUEUE_MAX_ATTEMPTS", 3)?,
            queue_backoff_base_ms: get_env_parse_or("QUEUE_BACKOFF_BASE_MS", 5_000)?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
