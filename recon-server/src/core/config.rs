//! Server configuration
//!
//! All configuration is read once at startup and passed down as an
//! explicit struct; nothing reads the environment after boot.

/// Server configuration — everything the reconciliation node needs
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | HTTP_PORT | 3000 | HTTP service port |
/// | DATA_DIR | /var/lib/aurum/recon | Embedded database directory |
/// | LOG_LEVEL | info | Tracing level filter |
/// | LOG_DIR | (stdout) | Daily-rolling log file directory |
/// | ENVIRONMENT | development | development \| staging \| production |
/// | CARRIER_BASE_URL | https://apiv2.shipcarrier.in | Carrier API base |
/// | CARRIER_EMAIL | (empty) | Carrier API login |
/// | CARRIER_PASSWORD | (empty) | Carrier API password |
/// | CARRIER_WEBHOOK_SECRET | (unset) | Enables carrier webhook HMAC check |
/// | CARRIER_TOKEN_TTL_MS | 86400000 | Carrier auth token cache TTL |
/// | GATEWAY_BASE_URL | https://api.paygateway.in | Payment gateway API base |
/// | GATEWAY_KEY_ID | (empty) | Gateway API key |
/// | GATEWAY_KEY_SECRET | (empty) | Gateway API secret |
/// | GATEWAY_WEBHOOK_SECRET | (empty) | Gateway webhook HMAC secret |
/// | EXTERNAL_TIMEOUT_MS | 10000 | Timeout for carrier/gateway calls |
/// | STUCK_UNSHIPPED_AFTER_MS | 172800000 | Paid-but-unshipped threshold (48h) |
/// | STUCK_PENDING_PAID_AFTER_MS | 86400000 | Pending-but-paid threshold (24h) |
/// | REFUND_LOOKBACK_MS | 604800000 | Cancelled-but-paid detection window (7d) |
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API service port
    pub http_port: u16,
    /// Embedded database directory
    pub data_dir: String,
    /// Tracing level filter
    pub log_level: String,
    /// Log file directory (stdout when unset)
    pub log_dir: Option<String>,
    /// Runtime environment: development | staging | production
    pub environment: String,
    /// Carrier API + webhook settings
    pub carrier: CarrierConfig,
    /// Payment gateway API + webhook settings
    pub gateway: GatewayConfig,
    /// Bounded timeout for all outbound carrier/gateway calls (ms)
    pub external_timeout_ms: u64,
    /// Stuck-entity detector thresholds
    pub stuck: StuckThresholds,
}

#[derive(Debug, Clone)]
pub struct CarrierConfig {
    pub base_url: String,
    pub email: String,
    pub password: String,
    /// When set, shipment/return webhooks are HMAC-verified.
    /// Verification failures still answer 200 per the carrier contract.
    pub webhook_secret: Option<String>,
    /// Auth token cache TTL (ms); safe to recompute on any node
    pub token_ttl_ms: i64,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    /// Refund webhooks are rejected with 401 on signature mismatch
    pub webhook_secret: String,
}

/// Divergence-detection thresholds, all unix-millisecond durations
#[derive(Debug, Clone)]
pub struct StuckThresholds {
    /// Online payment captured, no shipment identifier, older than this
    pub unshipped_after_ms: i64,
    /// Status still `pending` with payment `paid` past this
    pub pending_paid_after_ms: i64,
    /// `cancelled` with payment `paid` within this recent window
    pub refund_lookback_ms: i64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables,
    /// falling back to defaults where unset.
    pub fn from_env() -> Self {
        Self {
            http_port: env_parse("HTTP_PORT", 3000),
            data_dir: env_or("DATA_DIR", "/var/lib/aurum/recon"),
            log_level: env_or("LOG_LEVEL", "info"),
            log_dir: std::env::var("LOG_DIR").ok(),
            environment: env_or("ENVIRONMENT", "development"),
            carrier: CarrierConfig {
                base_url: env_or("CARRIER_BASE_URL", "https://apiv2.shipcarrier.in"),
                email: env_or("CARRIER_EMAIL", ""),
                password: env_or("CARRIER_PASSWORD", ""),
                webhook_secret: std::env::var("CARRIER_WEBHOOK_SECRET").ok(),
                token_ttl_ms: env_parse("CARRIER_TOKEN_TTL_MS", 24 * 60 * 60 * 1000),
            },
            gateway: GatewayConfig {
                base_url: env_or("GATEWAY_BASE_URL", "https://api.paygateway.in"),
                key_id: env_or("GATEWAY_KEY_ID", ""),
                key_secret: env_or("GATEWAY_KEY_SECRET", ""),
                webhook_secret: env_or("GATEWAY_WEBHOOK_SECRET", ""),
            },
            external_timeout_ms: env_parse("EXTERNAL_TIMEOUT_MS", 10_000),
            stuck: StuckThresholds {
                unshipped_after_ms: env_parse("STUCK_UNSHIPPED_AFTER_MS", 48 * 60 * 60 * 1000),
                pending_paid_after_ms: env_parse("STUCK_PENDING_PAID_AFTER_MS", 24 * 60 * 60 * 1000),
                refund_lookback_ms: env_parse("REFUND_LOOKBACK_MS", 7 * 24 * 60 * 60 * 1000),
            },
        }
    }

    /// Override port and data directory — used by tests
    pub fn with_overrides(data_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.data_dir = data_dir.into();
        config.http_port = http_port;
        config
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
