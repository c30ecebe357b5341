//! Typed configuration loaded from environment variables (spec §6).
//!
//! Follows the teacher's `AdminKeys::from_env` convention: a plain
//! `from_env()` constructor, `std::env::var(..).ok()` for optional values,
//! and `anyhow::bail!` for fatal missing configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub fast_model: String,
    pub powerful_model: String,
    pub embedding_model: String,
    /// Fixed at construction time per spec §9 Open Question (b); this build
    /// resolves it to 1536 (OpenAI `text-embedding-3-small`-class default).
    pub embedding_dimension: usize,
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub url: Option<String>,
    pub disabled: bool,
    pub search_ttl: Duration,
    pub structure_ttl: Duration,
    pub ai_response_ttl: Duration,
    pub popular_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: usize,
}

#[derive(Debug, Clone)]
pub struct ChannelsConfig {
    pub telegram_bot_token: Option<String>,
    pub whatsapp_verify_token: Option<String>,
    pub whatsapp_app_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u32,
    pub strict_window_ms: u64,
    pub strict_max_requests: u32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tls_key_path: Option<String>,
    pub tls_cert_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub channels: ChannelsConfig,
    pub rate_limit: RateLimitConfig,
    pub server: ServerConfig,
    pub website_base_url: String,
    pub category_keywords_path: Option<String>,
    /// When set, error responses may include the underlying error chain.
    pub dev_mode: bool,
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from process environment, applying `.env` first
    /// if present. A missing LLM API key is fatal; a missing cache URL only
    /// degrades the cache to disabled mode (spec §9 boot order).
    pub fn from_env() -> anyhow::Result<Self> {
        // Best-effort: a missing .env file is not an error.
        let _ = dotenvy::dotenv();

        let llm_api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| anyhow::anyhow!("LLM_API_KEY is required but not set"))?;

        let speech_api_key = std::env::var("SPEECH_API_KEY").unwrap_or_else(|_| llm_api_key.clone());

        let cache_url = std::env::var("CACHE_URL").ok();
        let disabled = std::env::var("DISABLE_CACHE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
            || cache_url.is_none();
        if disabled {
            tracing::warn!("cache disabled — every Get() will miss, every Set() is a no-op");
        }

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is required but not set"))?;

        Ok(Self {
            llm: LlmConfig {
                api_key: llm_api_key,
                fast_model: std::env::var("LLM_FAST_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                powerful_model: std::env::var("LLM_POWERFUL_MODEL")
                    .unwrap_or_else(|_| "gpt-4o".to_string()),
                embedding_model: std::env::var("LLM_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
                embedding_dimension: std::env::var("LLM_EMBEDDING_DIMENSION")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1536),
            },
            speech: SpeechConfig {
                api_key: speech_api_key,
            },
            cache: CacheConfig {
                url: cache_url,
                disabled,
                search_ttl: env_duration_secs("SEARCH_CACHE_TTL", 300),
                structure_ttl: env_duration_secs("STRUCTURE_CACHE_TTL", 1800),
                ai_response_ttl: env_duration_secs("AI_RESPONSE_CACHE_TTL", 3600),
                popular_ttl: env_duration_secs("POPULAR_SEARCH_CACHE_TTL", 900),
            },
            database: DatabaseConfig {
                url: database_url,
                pool_size: env_u32("DATABASE_POOL_SIZE", 10) as usize,
            },
            channels: ChannelsConfig {
                telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
                whatsapp_verify_token: std::env::var("WHATSAPP_VERIFY_TOKEN").ok(),
                whatsapp_app_secret: std::env::var("WHATSAPP_APP_SECRET").ok(),
            },
            rate_limit: RateLimitConfig {
                window_ms: env_u64("RATE_LIMIT_WINDOW_MS", 60_000),
                max_requests: env_u32("RATE_LIMIT_MAX_REQUESTS", 60),
                strict_window_ms: env_u64("RATE_LIMIT_STRICT_WINDOW_MS", 60_000),
                strict_max_requests: env_u32("RATE_LIMIT_STRICT_MAX_REQUESTS", 5),
            },
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_u32("SERVER_PORT", 8080) as u16,
                tls_key_path: std::env::var("TLS_KEY_PATH").ok(),
                tls_cert_path: std::env::var("TLS_CERT_PATH").ok(),
            },
            website_base_url: std::env::var("WEBSITE_BASE_URL")
                .unwrap_or_else(|_| crate::model::WEBSITE_BASE_URL.to_string()),
            category_keywords_path: std::env::var("CATEGORY_KEYWORDS_PATH").ok(),
            dev_mode: std::env::var("DEV_MODE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable mutation is process-global; serialize tests that
    // touch it so they don't race each other under `cargo test`.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_llm_key_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("LLM_API_KEY");
        std::env::remove_var("DATABASE_URL");
        let result = Config::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn cache_disabled_when_url_missing() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("LLM_API_KEY", "test-key");
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::remove_var("CACHE_URL");
        std::env::remove_var("DISABLE_CACHE");
        let config = Config::from_env().unwrap();
        assert!(config.cache.disabled);
        std::env::remove_var("LLM_API_KEY");
        std::env::remove_var("DATABASE_URL");
    }
}
