//! Configuration management for Srcent services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Legacy deployment variables (RESEND_API_KEY, CRON_SECRET, ...)
//! - Default values

use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Legacy environment variable names and the config keys they feed.
///
/// These sit beneath files and `APP__` variables, so either can override them.
pub const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("RESEND_API_KEY", "mail.api_key"),
    ("RESEND_FROM_EMAIL", "mail.from"),
    ("CRON_SECRET", "auth.cron_secret"),
    ("ADMIN_API_KEY", "auth.admin_api_key"),
    ("DASHSCOPE_API_KEY", "llm.api_key"),
    ("DASHSCOPE_MODEL", "llm.model"),
    ("DASHSCOPE_BASE_URL", "llm.api_base"),
    ("FIRECRAWL_API_KEY", "crawler.firecrawl_api_key"),
    ("COZE_API_KEY", "tts.api_key"),
    ("SITE_URL", "site.base_url"),
];

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (url is required)
    pub database: DatabaseConfig,

    /// Mail provider configuration
    #[serde(default)]
    pub mail: MailConfig,

    /// Digest batching configuration
    #[serde(default)]
    pub digest: DigestConfig,

    /// Shared secrets for the cron and admin triggers
    #[serde(default)]
    pub auth: AuthConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Crawler configuration
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub tts: TtsConfig,

    /// Public site configuration (links in emails, redirects)
    #[serde(default)]
    pub site: SiteConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// Resend API key; sending is skipped when absent
    pub api_key: Option<String>,

    /// Sender address
    #[serde(default = "default_mail_from")]
    pub from: String,

    /// Resend API base URL
    #[serde(default = "default_mail_api_base")]
    pub api_base: String,

    /// Request timeout in seconds
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DigestConfig {
    /// Recipients per batch
    #[serde(default = "default_digest_batch_size")]
    pub batch_size: usize,

    /// Pause between batches in milliseconds
    #[serde(default = "default_digest_batch_delay")]
    pub batch_delay_ms: u64,

    /// Recently published products fetched before removing the featured one
    #[serde(default = "default_digest_recent_limit")]
    pub recent_limit: u64,

    /// Maximum non-featured products in one email
    #[serde(default = "default_digest_others_limit")]
    pub others_limit: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Bearer secret expected from the scheduler; unset allows every caller
    pub cron_secret: Option<String>,

    /// Key expected in `?key=` on the manual trigger; unset allows every caller
    pub admin_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// API key for the chat-completions endpoint
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlerConfig {
    /// Firecrawl API key; the direct fetcher is used alone when absent
    pub firecrawl_api_key: Option<String>,

    /// Firecrawl API base URL
    #[serde(default = "default_firecrawl_api_base")]
    pub firecrawl_api_base: String,

    /// Request timeout in seconds
    #[serde(default = "default_crawler_timeout")]
    pub timeout_secs: u64,

    /// User agent for direct fetches
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TtsConfig {
    /// Coze API key; placeholder audio is produced when absent
    pub api_key: Option<String>,

    /// Workflow stream endpoint
    #[serde(default = "default_tts_api_url")]
    pub api_url: String,

    /// Podcast workflow id
    #[serde(default = "default_tts_workflow_id")]
    pub workflow_id: String,

    /// Longest script accepted by the workflow, in characters
    #[serde(default = "default_tts_max_chars")]
    pub max_chars: usize,

    /// Spoken characters per minute used to estimate duration
    #[serde(default = "default_tts_chars_per_minute")]
    pub chars_per_minute: u32,

    /// Base URL for placeholder audio
    #[serde(default = "default_tts_placeholder_base")]
    pub placeholder_base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Public site URL without trailing slash
    #[serde(default = "default_site_url")]
    pub base_url: String,

    /// Brand name used in emails
    #[serde(default = "default_site_name")]
    pub name: String,

    /// Offset from UTC used for dates shown to readers
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second on public write endpoints
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_mail_from() -> String { "Srcent <onboarding@resend.dev>".to_string() }
fn default_mail_api_base() -> String { "https://api.resend.com".to_string() }
fn default_mail_timeout() -> u64 { 15 }
fn default_digest_batch_size() -> usize { 100 }
fn default_digest_batch_delay() -> u64 { 1000 }
fn default_digest_recent_limit() -> u64 { 5 }
fn default_digest_others_limit() -> usize { 4 }
fn default_llm_api_base() -> String { "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string() }
fn default_llm_model() -> String { "qwen-max".to_string() }
fn default_llm_timeout() -> u64 { 120 }
fn default_firecrawl_api_base() -> String { "https://api.firecrawl.dev".to_string() }
fn default_crawler_timeout() -> u64 { 60 }
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}
fn default_tts_api_url() -> String { "https://api.coze.cn/v1/workflow/stream_run".to_string() }
fn default_tts_workflow_id() -> String { "7579302257063575602".to_string() }
fn default_tts_max_chars() -> usize { 15_000 }
fn default_tts_chars_per_minute() -> u32 { 200 }
fn default_tts_placeholder_base() -> String { "https://placeholder.supabase.co".to_string() }
fn default_tts_timeout() -> u64 { 600 }
fn default_site_url() -> String { "https://srcent.top".to_string() }
fn default_site_name() -> String { "Srcent".to_string() }
fn default_utc_offset() -> i32 { 8 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "srcent".to_string() }
fn default_rate_limit() -> u32 { 5 }
fn default_burst() -> u32 { 20 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = legacy_defaults(Config::builder())?
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = legacy_defaults(Config::builder())?
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

/// Seed the builder with values from legacy variable names that are set.
fn legacy_defaults(
    mut builder: ConfigBuilder<DefaultState>,
) -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
    for (var, key) in LEGACY_ENV_KEYS {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                builder = builder.set_default(*key, value)?;
            }
        }
    }
    Ok(builder)
}

impl LlmConfig {
    /// The ingestion commands cannot run without a model credential
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "missing language model API key (APP__LLM__API_KEY or DASHSCOPE_API_KEY)"
                    .to_string(),
            })
    }
}

impl MailConfig {
    /// Whether a mail credential is configured
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl DigestConfig {
    /// Pause between batches as Duration
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/srcent".to_string(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            from: default_mail_from(),
            api_base: default_mail_api_base(),
            timeout_secs: default_mail_timeout(),
        }
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_digest_batch_size(),
            batch_delay_ms: default_digest_batch_delay(),
            recent_limit: default_digest_recent_limit(),
            others_limit: default_digest_others_limit(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_llm_api_base(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            firecrawl_api_key: None,
            firecrawl_api_base: default_firecrawl_api_base(),
            timeout_secs: default_crawler_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_tts_api_url(),
            workflow_id: default_tts_workflow_id(),
            max_chars: default_tts_max_chars(),
            chars_per_minute: default_tts_chars_per_minute(),
            placeholder_base_url: default_tts_placeholder_base(),
            timeout_secs: default_tts_timeout(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_site_url(),
            name: default_site_name(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            mail: MailConfig::default(),
            digest: DigestConfig::default(),
            auth: AuthConfig::default(),
            llm: LlmConfig::default(),
            crawler: CrawlerConfig::default(),
            tts: TtsConfig::default(),
            site: SiteConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
