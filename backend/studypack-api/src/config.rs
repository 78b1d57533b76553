use serde::Deserialize;
use std::env;

use crate::services::gemini_client::DEFAULT_GEMINI_MODEL;

const DEV_JWT_SECRET: &str = "dev-secret-only-for-local-testing";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self, config::ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            other => Err(config::ConfigError::Message(format!(
                "Unknown storage backend: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Cross-instance material locks are used only when set.
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub tutor_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub generation_workers: usize,
    pub generation_queue_capacity: usize,
    pub lock_ttl_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::Memory,
            mongo_uri: "mongodb://localhost:27017/?replicaSet=rs0".to_string(),
            mongo_database: "studypack".to_string(),
            redis_uri: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            bind_addr: "0.0.0.0:8081".to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            tutor_timeout_secs: 30,
            generation_timeout_secs: 60,
            generation_workers: 2,
            generation_queue_capacity: 64,
            lock_ttl_ms: 120_000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let string_setting = |key: &str, env_key: &str| -> Option<String> {
            settings
                .get_string(key)
                .ok()
                .or_else(|| env::var(env_key).ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number_setting = |key: &str, env_key: &str, default: u64| -> u64 {
            settings
                .get_int(key)
                .ok()
                .and_then(|v| u64::try_from(v).ok())
                .or_else(|| env::var(env_key).ok().and_then(|v| v.parse().ok()))
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        let storage_backend = match string_setting("storage.backend", "STORAGE_BACKEND") {
            Some(value) => StorageBackend::parse(&value)?,
            None => StorageBackend::Mongo,
        };

        let jwt_secret = match string_setting("auth.jwt_secret", "JWT_SECRET") {
            Some(secret) => secret,
            None if env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            None => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                DEV_JWT_SECRET.to_string()
            }
        };

        let config = Config {
            storage_backend,
            mongo_uri: string_setting("database.mongo_uri", "MONGO_URI")
                .unwrap_or(defaults.mongo_uri),
            mongo_database: string_setting("database.mongo_database", "MONGO_DATABASE")
                .unwrap_or(defaults.mongo_database),
            redis_uri: string_setting("redis.uri", "REDIS_URI"),
            jwt_secret,
            bind_addr: string_setting("server.bind_addr", "BIND_ADDR")
                .unwrap_or(defaults.bind_addr),
            gemini_api_key: string_setting("gemini.api_key", "GEMINI_API_KEY"),
            gemini_model: string_setting("gemini.model", "GEMINI_MODEL")
                .unwrap_or(defaults.gemini_model),
            tutor_timeout_secs: number_setting(
                "gemini.timeout_secs",
                "TUTOR_TIMEOUT_SECS",
                defaults.tutor_timeout_secs,
            ),
            generation_timeout_secs: number_setting(
                "generation.timeout_secs",
                "GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout_secs,
            ),
            generation_workers: number_setting(
                "generation.workers",
                "GENERATION_WORKERS",
                defaults.generation_workers as u64,
            ) as usize,
            generation_queue_capacity: number_setting(
                "generation.queue_capacity",
                "GENERATION_QUEUE_CAPACITY",
                defaults.generation_queue_capacity as u64,
            ) as usize,
            lock_ttl_ms: number_setting("redis.lock_ttl_ms", "LOCK_TTL_MS", defaults.lock_ttl_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// A material lock must outlive the longest generation run it guards.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let generation_ms = self.generation_timeout_secs.saturating_mul(1000);
        if self.lock_ttl_ms <= generation_ms {
            return Err(config::ConfigError::Message(format!(
                "lock_ttl_ms ({}) must exceed generation_timeout_secs ({}s)",
                self.lock_ttl_ms, self.generation_timeout_secs
            )));
        }
        Ok(())
    }
}
