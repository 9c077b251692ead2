use std::time::Duration;

/// Full service configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development; override via
/// environment variables (a `.env` file is loaded by the binary before this
/// runs). Invalid values fail fast at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub limiter: LimiterConfig,
    pub database: DatabaseConfig,
    pub completion: CompletionConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub cache: CacheConfig,
    /// Ceiling on SQL regeneration attempts before the pipeline accepts its
    /// current state as final.
    pub max_text_to_sql_retries: u32,
}

/// HTTP server settings.
///
/// | Env Var                | Default                 |
/// |------------------------|-------------------------|
/// | `HOST`                 | `0.0.0.0`               |
/// | `PORT`                 | `8010`                  |
/// | `CORS_ORIGINS`         | `http://localhost:5173` |
/// | `REQUEST_TIMEOUT_SECS` | `600`                   |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

/// Admission control settings.
///
/// | Env Var                   | Default |
/// |---------------------------|---------|
/// | `MAX_CONCURRENT_REQUESTS` | `10`    |
/// | `REQUEST_QUEUE_TIMEOUT`   | `300`   |
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub max_concurrent: usize,
    /// Seconds a request may wait in the admission queue.
    pub queue_timeout: Duration,
}

/// Relational store settings. `DATABASE_URL` is optional: without it the
/// service starts with the store reported as `not_initialized`.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

/// Text-completion service settings (OpenAI-compatible endpoint).
///
/// | Env Var                  | Default                        |
/// |--------------------------|--------------------------------|
/// | `COMPLETION_SERVER_URL`  | `http://localhost:8000/v1`     |
/// | `COMPLETION_MODEL_NAME`  | `qwencoder-32b`                |
/// | `COMPLETION_API_KEY`     | `EMPTY`                        |
/// | `COMPLETION_TEMPERATURE` | `0`                            |
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub server_url: String,
    pub model_name: String,
    pub api_key: String,
    pub temperature: f32,
}

/// Embedding service settings (Ollama-style endpoint).
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
}

/// Vector-search connection pool settings.
///
/// | Env Var                              | Default                 |
/// |--------------------------------------|-------------------------|
/// | `VECTOR_STORE_URL`                   | `http://localhost:8080` |
/// | `VECTOR_STORE_ENABLED`               | `true`                  |
/// | `VECTOR_STORE_SCHEMA_COLLECTION`     | `m_asset_schema`        |
/// | `VECTOR_STORE_SAMPLE_COLLECTION`     | `m_asset_sample_query`  |
/// | `VECTOR_STORE_MIN_CONNECTIONS`       | `2`                     |
/// | `VECTOR_STORE_MAX_CONNECTIONS`       | `10`                    |
/// | `VECTOR_STORE_CONNECTION_LIFETIME`   | `3600` (seconds)        |
/// | `VECTOR_STORE_HEALTH_CHECK_INTERVAL` | `60` (seconds)          |
/// | `VECTOR_STORE_CHECKOUT_TIMEOUT`      | `30` (seconds)          |
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub url: String,
    pub enabled: bool,
    pub schema_collection: String,
    pub sample_collection: String,
    pub min_connections: usize,
    pub max_connections: usize,
    pub connection_lifetime: Duration,
    pub health_check_interval: Duration,
    pub checkout_timeout: Duration,
}

/// Generated-SQL cache settings. Caches only SQL generation responses,
/// never synthesized answers.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_entries: usize,
}

impl AppConfig {
    /// Load the full configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parse_var("PORT", "8010"),
                cors_origins: var_or("CORS_ORIGINS", "http://localhost:5173")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", "600"),
            },
            limiter: LimiterConfig {
                max_concurrent: parse_var("MAX_CONCURRENT_REQUESTS", "10"),
                queue_timeout: Duration::from_secs(parse_var("REQUEST_QUEUE_TIMEOUT", "300")),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").ok(),
            },
            completion: CompletionConfig {
                server_url: var_or("COMPLETION_SERVER_URL", "http://localhost:8000/v1"),
                model_name: var_or("COMPLETION_MODEL_NAME", "qwencoder-32b"),
                api_key: var_or("COMPLETION_API_KEY", "EMPTY"),
                temperature: parse_var("COMPLETION_TEMPERATURE", "0"),
            },
            embedding: EmbeddingConfig {
                base_url: var_or("EMBEDDING_BASE_URL", "http://localhost:11434"),
                model: var_or("EMBEDDING_MODEL", "bge-m3:latest"),
            },
            vector_store: VectorStoreConfig {
                url: var_or("VECTOR_STORE_URL", "http://localhost:8080"),
                enabled: parse_var("VECTOR_STORE_ENABLED", "true"),
                schema_collection: var_or("VECTOR_STORE_SCHEMA_COLLECTION", "m_asset_schema"),
                sample_collection: var_or("VECTOR_STORE_SAMPLE_COLLECTION", "m_asset_sample_query"),
                min_connections: parse_var("VECTOR_STORE_MIN_CONNECTIONS", "2"),
                max_connections: parse_var("VECTOR_STORE_MAX_CONNECTIONS", "10"),
                connection_lifetime: Duration::from_secs(parse_var(
                    "VECTOR_STORE_CONNECTION_LIFETIME",
                    "3600",
                )),
                health_check_interval: Duration::from_secs(parse_var(
                    "VECTOR_STORE_HEALTH_CHECK_INTERVAL",
                    "60",
                )),
                checkout_timeout: Duration::from_secs(parse_var(
                    "VECTOR_STORE_CHECKOUT_TIMEOUT",
                    "30",
                )),
            },
            cache: CacheConfig {
                enabled: parse_var("SQL_CACHE_ENABLED", "false"),
                ttl: Duration::from_secs(parse_var("SQL_CACHE_TTL", "3600")),
                max_entries: parse_var("SQL_CACHE_MAX_ENTRIES", "1024"),
            },
            max_text_to_sql_retries: parse_var("MAX_TEXT_TO_SQL_RETRIES", "3"),
        }
    }
}

/// Read an environment variable, falling back to `default`.
fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

/// Read and parse an environment variable, panicking at startup on an
/// unparseable value (misconfiguration should fail fast).
fn parse_var<T>(key: &str, default: &str) -> T
where
    T: std::str::FromStr,
{
    let raw = var_or(key, default);
    raw.parse().unwrap_or_else(|_| {
        panic!("{key} must be a valid {}, got \"{raw}\"", std::any::type_name::<T>())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var mutation is process-global, so these tests only exercise the
    // default path and the helpers.

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::from_env();
        assert!(config.limiter.max_concurrent >= 1);
        assert!(config.vector_store.min_connections <= config.vector_store.max_connections);
        assert!(config.max_text_to_sql_retries >= 1);
    }

    #[test]
    fn parse_var_uses_default() {
        let port: u16 = parse_var("MASSET_TEST_UNSET_PORT", "8010");
        assert_eq!(port, 8010);
    }
}
