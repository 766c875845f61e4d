use secrecy::Secret;
use serde::{Deserialize, Serialize};

/// Which backing store the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Postgres,
    /// Process-local store for tests and local development. Data is lost on restart.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Option<String>,
    pub storage: StorageKind,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,

    // Bearer tokens
    pub token_secret: Secret<String>,
    pub token_ttl_secs: i64,

    // Check-in rules
    pub qr_scheme: String,
    pub duplicate_window_secs: i64,
    pub qr_max_age_secs: Option<i64>,

    // First admin account, created on start-up when no admin exists
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<Secret<String>>,
}

pub const DEFAULT_QR_SCHEME: &str = "trailtag";
pub const DEFAULT_DUPLICATE_WINDOW_SECS: i64 = 5 * 60;
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 12 * 60 * 60;
/// Upper bound for every duration setting (ten years)
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        let storage = match config.get::<String>("storage") {
            Ok(kind) => parse_storage_kind(&kind)?,
            Err(_) => StorageKind::Postgres,
        };

        let database_url: Option<String> = config.get("database_url").ok();
        if storage == StorageKind::Postgres && database_url.is_none() {
            return Err(config::ConfigError::NotFound("database_url".to_string()));
        }

        let duplicate_window_secs = seconds_setting(
            "duplicate_window_secs",
            config
                .get::<i64>("duplicate_window_secs")
                .unwrap_or(DEFAULT_DUPLICATE_WINDOW_SECS),
            0,
        )?;
        let token_ttl_secs = seconds_setting(
            "token_ttl_secs",
            config
                .get::<i64>("token_ttl_secs")
                .unwrap_or(DEFAULT_TOKEN_TTL_SECS),
            1,
        )?;
        let qr_max_age_secs = config
            .get::<i64>("qr_max_age_secs")
            .ok()
            .map(|secs| seconds_setting("qr_max_age_secs", secs, 1))
            .transpose()?;

        Ok(Self {
            database_url,
            storage,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port").unwrap_or(8080),
            db_max_connections: config.get("db_max_connections").unwrap_or(20),

            token_secret: Secret::new(config.get("token_secret")?),
            token_ttl_secs,

            qr_scheme: config
                .get("qr_scheme")
                .unwrap_or_else(|_| DEFAULT_QR_SCHEME.to_string()),
            duplicate_window_secs,
            qr_max_age_secs,

            bootstrap_admin_email: config.get("bootstrap_admin_email").ok(),
            bootstrap_admin_password: config
                .get::<String>("bootstrap_admin_password")
                .ok()
                .map(Secret::new),
        })
    }

    /// Settings for tests and local runs against the in-memory store.
    pub fn for_memory(token_secret: &str) -> Self {
        Self {
            database_url: None,
            storage: StorageKind::Memory,
            host: "127.0.0.1".to_string(),
            port: 0,
            db_max_connections: 1,
            token_secret: Secret::new(token_secret.to_string()),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            qr_scheme: DEFAULT_QR_SCHEME.to_string(),
            duplicate_window_secs: DEFAULT_DUPLICATE_WINDOW_SECS,
            qr_max_age_secs: None,
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
        }
    }
}

/// Rejects durations outside `min..=MAX_DURATION_SECS`
fn seconds_setting(name: &str, value: i64, min: i64) -> Result<i64, config::ConfigError> {
    if (min..=MAX_DURATION_SECS).contains(&value) {
        Ok(value)
    } else {
        Err(config::ConfigError::Message(format!(
            "{} must be between {} and {} seconds, got {}",
            name, min, MAX_DURATION_SECS, value
        )))
    }
}

fn parse_storage_kind(kind: &str) -> Result<StorageKind, config::ConfigError> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Ok(StorageKind::Postgres),
        "memory" => Ok(StorageKind::Memory),
        other => Err(config::ConfigError::Message(format!(
            "unknown storage kind: {}",
            other
        ))),
    }
}
