use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::location::ip_api::DEFAULT_IP_API_URL;
use crate::location::TrustedProxyMode;
use crate::storage::DEFAULT_NAMESPACE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub api_server: ServerConfig,
    pub redirect_server: ServerConfig,
    /// Public base URL short codes are appended to
    pub redirect_base_url: String,
    pub shortener: ShortenerConfig,
    pub location: LocationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    /// Directory for `file`, connection string for `sqlite`/`postgres`
    pub url: String,
    pub max_connections: u32,
    pub namespace: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Memory,
    File,
    Sqlite,
    Postgres,
}

impl DatabaseBackend {
    fn default_url(self) -> &'static str {
        match self {
            DatabaseBackend::Memory => "",
            DatabaseBackend::File => "./linkstash-data",
            DatabaseBackend::Sqlite => "sqlite://./linkstash.db?mode=rwc",
            DatabaseBackend::Postgres => "postgres://localhost/linkstash",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenerConfig {
    pub default_validity_minutes: u32,
    pub max_batch_size: usize,
    pub generated_code_length: usize,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            default_validity_minutes: 30,
            max_batch_size: 5,
            generated_code_length: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationBackend {
    None,
    IpApi,
    GeoIp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub provider: LocationBackend,
    pub api_url: String,
    #[serde(default)]
    pub geoip_city_db: Option<String>,
    pub timeout_ms: u64,
    pub trusted_proxy_mode: TrustedProxyMode,
    /// Proxies of our own in front of the redirect server
    pub trusted_hops: usize,
}

impl LocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            provider: LocationBackend::None,
            api_url: DEFAULT_IP_API_URL.to_string(),
            geoip_city_db: None,
            timeout_ms: 3000,
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_hops: 0,
        }
    }
}

impl DatabaseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match env_or("DATABASE_BACKEND", "file").to_lowercase().as_str() {
            "memory" => DatabaseBackend::Memory,
            "file" => DatabaseBackend::File,
            "sqlite" => DatabaseBackend::Sqlite,
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'file'. Supported values: memory, file, sqlite, postgres"
                );
                DatabaseBackend::File
            }
        };

        let database = DatabaseConfig {
            backend,
            url: env_or("DATABASE_URL", backend.default_url()),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5)?,
            namespace: env_or("STORE_NAMESPACE", DEFAULT_NAMESPACE),
            timeout_ms: env_parse("STORAGE_TIMEOUT_MS", 3000)?,
        };

        let cache = CacheConfig {
            enabled: env_flag("CACHE_ENABLED", true),
            ttl_secs: env_parse("CACHE_TTL_SECS", 300)?,
        };

        let defaults = ShortenerConfig::default();
        let shortener = ShortenerConfig {
            default_validity_minutes: env_parse(
                "DEFAULT_VALIDITY_MINUTES",
                defaults.default_validity_minutes,
            )?,
            max_batch_size: env_parse("MAX_BATCH_SIZE", defaults.max_batch_size)?,
            generated_code_length: env_parse("SHORT_CODE_LENGTH", defaults.generated_code_length)?,
        };
        if shortener.default_validity_minutes == 0 {
            anyhow::bail!("DEFAULT_VALIDITY_MINUTES must be positive");
        }
        if shortener.generated_code_length == 0 {
            anyhow::bail!("SHORT_CODE_LENGTH must be positive");
        }

        let provider = match env_or("LOCATION_PROVIDER", "none").to_lowercase().as_str() {
            "none" => LocationBackend::None,
            "ipapi" => LocationBackend::IpApi,
            "geoip" => LocationBackend::GeoIp,
            other => {
                tracing::warn!(
                    "Unknown LOCATION_PROVIDER '{other}', falling back to 'none'. Supported values: none, ipapi, geoip"
                );
                LocationBackend::None
            }
        };

        let trusted_proxy_mode = match env_or("TRUSTED_PROXY_MODE", "none").to_lowercase().as_str() {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let geoip_city_db = std::env::var("GEOIP_CITY_DB").ok();
        if provider == LocationBackend::GeoIp && geoip_city_db.is_none() {
            anyhow::bail!("GEOIP_CITY_DB must be set when LOCATION_PROVIDER=geoip");
        }

        let location = LocationConfig {
            provider,
            api_url: env_or("LOCATION_API_URL", DEFAULT_IP_API_URL),
            geoip_city_db,
            timeout_ms: env_parse("LOCATION_TIMEOUT_MS", 3000)?,
            trusted_proxy_mode,
            trusted_hops: env_parse("TRUSTED_PROXY_HOPS", 0)?,
        };

        Ok(Config {
            database,
            cache,
            api_server: ServerConfig {
                host: env_or("API_HOST", "127.0.0.1"),
                port: env_parse("API_PORT", 8080)?,
            },
            redirect_server: ServerConfig {
                host: env_or("REDIRECT_HOST", "127.0.0.1"),
                port: env_parse("REDIRECT_PORT", 3000)?,
            },
            redirect_base_url: env_or("REDIRECT_BASE_URL", "http://localhost:3000"),
            shortener,
            location,
        })
    }
}
