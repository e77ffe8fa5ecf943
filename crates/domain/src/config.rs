//! Environment-driven configuration structures shared by all binaries.

use std::{env, net::IpAddr, time::Duration};

use thiserror::Error;

/// API-specific configuration (HTTP bind + shared database) so the HTTP
/// surface does not depend on sweeper-only environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    database_url: String,
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
    site: SiteConfig,
}

impl ApiConfig {
    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
            site: SiteConfig::load_from_env()?,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }
}

/// Application settings consumed by the logic objects. Passed explicitly to
/// every action instead of living in process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    record_ttl: Duration,
    authenticity_secret: Option<String>,
    authenticity_max_number: u64,
    rate_limit_window: Duration,
    notice_dismiss: Duration,
    doh_url: String,
    trusted_proxies: Vec<IpAddr>,
}

impl SiteConfig {
    pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);
    pub const DEFAULT_MAX_NUMBER: u64 = 100_000;
    pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(20 * 60);
    pub const DEFAULT_NOTICE_DISMISS: Duration = Duration::from_millis(5_000);
    pub const DEFAULT_DOH_URL: &'static str = "https://cloudflare-dns.com/dns-query";

    /// Reads the optional site knobs; every entry has a default.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let defaults = Self::default();
        Ok(Self {
            record_ttl: get_optional_u64("RECORD_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.record_ttl),
            authenticity_secret: get_optional_var("AUTHENTICITY_SECRET_KEY"),
            authenticity_max_number: get_optional_u64("AUTHENTICITY_MAX_NUMBER")?
                .filter(|value| *value > 0)
                .unwrap_or(defaults.authenticity_max_number),
            rate_limit_window: get_optional_u64("RATE_LIMIT_WINDOW_SECS")?
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            notice_dismiss: get_optional_u64("NOTICE_DISMISS_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.notice_dismiss),
            doh_url: get_optional_var("DOMAIN_VALIDATION_DOH_URL").unwrap_or(defaults.doh_url),
            trusted_proxies: get_ip_list("API_TRUSTED_PROXIES")?,
        })
    }

    pub fn with_record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    pub fn with_authenticity_secret(mut self, secret: impl Into<String>) -> Self {
        self.authenticity_secret = Some(secret.into());
        self
    }

    pub fn with_authenticity_max_number(mut self, max_number: u64) -> Self {
        self.authenticity_max_number = max_number.max(1);
        self
    }

    pub fn with_notice_dismiss(mut self, dismiss: Duration) -> Self {
        self.notice_dismiss = dismiss;
        self
    }

    pub fn with_trusted_proxies(mut self, proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        self.trusted_proxies = proxies.into_iter().collect();
        self
    }

    pub fn record_ttl(&self) -> Duration {
        self.record_ttl
    }

    pub fn authenticity_secret(&self) -> Option<&str> {
        self.authenticity_secret.as_deref()
    }

    pub fn authenticity_max_number(&self) -> u64 {
        self.authenticity_max_number
    }

    pub fn rate_limit_window(&self) -> Duration {
        self.rate_limit_window
    }

    pub fn notice_dismiss(&self) -> Duration {
        self.notice_dismiss
    }

    pub fn doh_url(&self) -> &str {
        &self.doh_url
    }

    /// Peers allowed to forward client addresses and customer identity.
    pub fn trusted_proxies(&self) -> &[IpAddr] {
        &self.trusted_proxies
    }

    pub fn is_trusted_proxy(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.contains(&ip)
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            record_ttl: Self::DEFAULT_RECORD_TTL,
            authenticity_secret: None,
            authenticity_max_number: Self::DEFAULT_MAX_NUMBER,
            rate_limit_window: Self::DEFAULT_RATE_LIMIT_WINDOW,
            notice_dismiss: Self::DEFAULT_NOTICE_DISMISS,
            doh_url: Self::DEFAULT_DOH_URL.to_string(),
            trusted_proxies: Vec::new(),
        }
    }
}

/// Configuration for the background sweeper that purges lapsed records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    database_url: String,
    interval: Duration,
}

impl SweeperConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// required process variables. Missing or malformed entries surface as
    /// `ConfigError` so binaries can respond gracefully.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let database_url = get_required_var("DATABASE_URL")?;
        let interval = get_optional_u64("SWEEPER_INTERVAL_SECS")?
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or(Self::DEFAULT_INTERVAL);

        Ok(Self {
            database_url,
            interval,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_optional_u64(key: &'static str) -> Result<Option<u64>, ConfigError> {
    get_optional_var(key)
        .map(|value| {
            value
                .parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

/// Comma-separated IP addresses; unset means an empty list.
fn get_ip_list(key: &'static str) -> Result<Vec<IpAddr>, ConfigError> {
    let Some(value) = get_optional_var(key) else {
        return Ok(Vec::new());
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse()
                .map_err(|source| ConfigError::InvalidAddress { key, source })
        })
        .collect()
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("VANISH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid IP address in `{key}`: {source}")]
    InvalidAddress {
        key: &'static str,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
