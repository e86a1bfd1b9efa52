//! Application configuration management.
//!
//! Sources are layered: `config/default`, then `config/{RUN_MODE}`, then
//! `MERCHANT__SECTION__KEY` environment variables.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtConfig,
    /// Log output configuration.
    #[serde(default)]
    pub log: LogConfig,
    /// Webhook dispatcher configuration.
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Event bus configuration.
    #[serde(default)]
    pub bus: BusConfig,
    /// Live dashboard gateway configuration.
    #[serde(default)]
    pub live: LiveConfig,
    /// Tenant resolution configuration.
    #[serde(default)]
    pub tenant: TenantConfig,
    /// Daily closing configuration.
    #[serde(default)]
    pub closing: ClosingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// JWT configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Secret key for signing tokens.
    pub secret: String,
    /// Access token expiration in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
}

fn default_access_token_expiry() -> u64 {
    900 // 15 minutes
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Webhook dispatcher configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Number of concurrent delivery workers.
    pub workers: usize,
    /// Deliveries claimed per poll.
    pub batch_size: u64,
    /// Idle poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Wall-clock bound on a single HTTP attempt.
    pub request_timeout_secs: u64,
    /// How long a claim stays exclusive to one worker.
    pub lease_secs: u64,
    /// Attempts before a delivery is marked exhausted.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_secs: u64,
    /// Ceiling on any single retry delay.
    pub max_delay_secs: u64,
    /// Consecutive failed attempts that deactivate an endpoint.
    pub disable_after_failures: u32,
    /// User-Agent header sent with every attempt.
    pub user_agent: String,
    /// Interval of the outbox sweep; events older than this that were not
    /// fanned out yet are picked up by it.
    pub outbox_sweep_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: 16,
            poll_interval_ms: 1_000,
            request_timeout_secs: 10,
            lease_secs: 60,
            max_attempts: 6,
            base_delay_secs: 30,
            max_delay_secs: 3_600,
            disable_after_failures: 10,
            user_agent: "MerchantPlus-Webhook/1.0".to_string(),
            outbox_sweep_secs: 30,
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Attempts a sink gets per event before the bus moves on. Webhook
    /// fan-out left undone is recovered from the outbox.
    pub sink_retry_attempts: u32,
    /// First retry delay for a failing sink, doubled per attempt.
    pub sink_retry_base_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            sink_retry_attempts: 5,
            sink_retry_base_ms: 100,
        }
    }
}

/// Live dashboard gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Events buffered per session before new ones are dropped.
    pub session_buffer: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self { session_buffer: 64 }
    }
}

/// Tenant resolution configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Membership cache lifetime; zero disables caching.
    pub cache_ttl_secs: u64,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 30 }
    }
}

/// Daily closing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClosingConfig {
    /// Run the background closing scheduler.
    pub enabled: bool,
    /// Seconds between scheduler passes.
    pub interval_secs: u64,
    /// IANA timezone that defines a business day.
    pub timezone: String,
}

impl Default for ClosingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3_600,
            timezone: "UTC".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("MERCHANT").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
