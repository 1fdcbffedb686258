//! Sender configuration.
//!
//! [`SenderConfig`] carries everything needed to build a sender: store
//! connection settings, queue defaults, breaker and rate-limit parameters,
//! TLS material and the log level. It can be built programmatically from
//! [`Default`] with the `with_*` setters, or loaded from `VALKEY_SENDER_*`
//! environment variables.
//!
//! Malformed environment values are logged and replaced by the default for
//! that field; the resulting configuration is then validated as a whole.

use crate::application::circuit_breaker::CircuitBreakerConfig;
use crate::application::ports::{TtlMode, MAX_TTL};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Prefix shared by all configuration variables.
pub const ENV_PREFIX: &str = "VALKEY_SENDER_";

/// Highest logical database index accepted.
pub const MAX_DATABASE: u32 = 15;

/// Errors found while validating a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("address cannot be empty")]
    EmptyAddress,

    #[error("database must be between 0 and 15, got {0}")]
    InvalidDatabase(u32),

    /// A connection timeout is shorter than one millisecond
    #[error("{0} must be at least 1ms")]
    TimeoutTooShort(&'static str),

    #[error("pool size must be at least 1")]
    ZeroPoolSize,

    #[error("min idle connections ({min_idle}) cannot exceed pool size ({pool_size})")]
    MinIdleExceedsPool { min_idle: u32, pool_size: u32 },

    #[error("default queue name cannot be empty")]
    EmptyDefaultQueue,

    #[error("message TTL must be at least 1 second")]
    TtlTooShort,

    #[error("message TTL cannot exceed {max:?}", max = MAX_TTL)]
    TtlTooLong,

    #[error("retry delay must be at least 1ms")]
    RetryDelayTooShort,

    #[error("rate limit must be greater than 0, got {0}")]
    InvalidRateLimit(f64),

    #[error("rate limit burst must be at least 1")]
    ZeroBurst,

    #[error("TLS cert file and key file are required when TLS is enabled")]
    MissingTlsCertificate,
}

/// TLS settings for the store connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    pub enabled: bool,
    /// Accept any server certificate
    pub skip_verify: bool,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
}

/// Complete sender configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SenderConfig {
    /// `host:port` of the store
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Logical database index, 0 to 15
    pub database: u32,

    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,

    /// Connection pool limits. A single multiplexed connection serves all
    /// calls, so these are validated but not otherwise applied.
    pub pool_size: u32,
    pub min_idle_conns: u32,
    pub max_idle_time: Duration,
    pub conn_max_lifetime: Duration,

    /// Queue used when a [`Sender`](crate::Sender) call names no queue
    pub default_queue: String,
    /// Queue expiry applied by default sends
    pub message_ttl: Duration,
    pub ttl_mode: TtlMode,

    /// Retry budget. Sends are never retried internally; these are carried
    /// for callers that implement their own retry loop.
    pub max_retries: u32,
    pub retry_delay: Duration,

    pub breaker: CircuitBreakerConfig,

    /// Sustained calls per second
    pub rate_limit_requests: f64,
    /// Calls allowed in a burst
    pub rate_limit_burst: u32,

    pub tls: TlsConfig,

    /// `TRACE`, `DEBUG`, `INFO`, `WARN` or `ERROR`
    pub log_level: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            address: "localhost:6379".to_string(),
            username: None,
            password: None,
            database: 0,
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
            pool_size: 10,
            min_idle_conns: 2,
            max_idle_time: Duration::from_secs(5 * 60),
            conn_max_lifetime: Duration::from_secs(60 * 60),
            default_queue: "user-registrations".to_string(),
            message_ttl: Duration::from_secs(24 * 60 * 60),
            ttl_mode: TtlMode::Sliding,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            breaker: CircuitBreakerConfig::default(),
            rate_limit_requests: 1000.0,
            rate_limit_burst: 2000,
            tls: TlsConfig::default(),
            log_level: "INFO".to_string(),
        }
    }
}

impl SenderConfig {
    /// Load and validate configuration from `VALKEY_SENDER_*` variables.
    ///
    /// # Errors
    /// Returns `ConfigError` if the loaded configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load and validate configuration from an arbitrary variable source.
    ///
    /// `lookup` receives full variable names such as `VALKEY_SENDER_ADDRESS`.
    /// Unset and empty variables keep their defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` if the loaded configuration is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvSource { lookup };
        let defaults = Self::default();

        let config = Self {
            address: vars.string("ADDRESS", defaults.address),
            username: vars.optional("USERNAME"),
            password: vars.optional("PASSWORD"),
            database: vars.parsed("DATABASE", defaults.database),
            dial_timeout: vars.duration("DIAL_TIMEOUT", defaults.dial_timeout),
            read_timeout: vars.duration("READ_TIMEOUT", defaults.read_timeout),
            write_timeout: vars.duration("WRITE_TIMEOUT", defaults.write_timeout),
            pool_size: vars.parsed("POOL_SIZE", defaults.pool_size),
            min_idle_conns: vars.parsed("MIN_IDLE_CONNS", defaults.min_idle_conns),
            max_idle_time: vars.duration("MAX_IDLE_TIME", defaults.max_idle_time),
            conn_max_lifetime: vars.duration("CONN_MAX_LIFETIME", defaults.conn_max_lifetime),
            default_queue: vars.string("DEFAULT_QUEUE", defaults.default_queue),
            message_ttl: vars.duration("MESSAGE_TTL", defaults.message_ttl),
            ttl_mode: vars.ttl_mode("TTL_MODE", defaults.ttl_mode),
            max_retries: vars.parsed("MAX_RETRIES", defaults.max_retries),
            retry_delay: vars.duration("RETRY_DELAY", defaults.retry_delay),
            breaker: CircuitBreakerConfig {
                max_requests: vars.parsed("BREAKER_MAX_REQUESTS", defaults.breaker.max_requests),
                interval: vars.duration("BREAKER_INTERVAL", defaults.breaker.interval),
                timeout: vars.duration("BREAKER_TIMEOUT", defaults.breaker.timeout),
                failure_threshold: vars.parsed(
                    "BREAKER_FAILURE_THRESHOLD",
                    defaults.breaker.failure_threshold,
                ),
            },
            rate_limit_requests: vars.parsed("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests),
            rate_limit_burst: vars.parsed("RATE_LIMIT_BURST", defaults.rate_limit_burst),
            tls: TlsConfig {
                enabled: vars.boolean("TLS_ENABLED", false),
                skip_verify: vars.boolean("TLS_SKIP_VERIFY", false),
                cert_file: vars.optional("TLS_CERT_FILE").map(PathBuf::from),
                key_file: vars.optional("TLS_KEY_FILE").map(PathBuf::from),
                ca_file: vars.optional("TLS_CA_FILE").map(PathBuf::from),
            },
            log_level: vars.string("LOG_LEVEL", defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every field against its allowed range.
    ///
    /// # Errors
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const MIN_TIMEOUT: Duration = Duration::from_millis(1);

        if self.address.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.database > MAX_DATABASE {
            return Err(ConfigError::InvalidDatabase(self.database));
        }
        for (name, timeout) in [
            ("dial timeout", self.dial_timeout),
            ("read timeout", self.read_timeout),
            ("write timeout", self.write_timeout),
        ] {
            if timeout < MIN_TIMEOUT {
                return Err(ConfigError::TimeoutTooShort(name));
            }
        }
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        if self.min_idle_conns > self.pool_size {
            return Err(ConfigError::MinIdleExceedsPool {
                min_idle: self.min_idle_conns,
                pool_size: self.pool_size,
            });
        }
        if self.default_queue.is_empty() {
            return Err(ConfigError::EmptyDefaultQueue);
        }
        if self.message_ttl < Duration::from_secs(1) {
            return Err(ConfigError::TtlTooShort);
        }
        if self.message_ttl > MAX_TTL {
            return Err(ConfigError::TtlTooLong);
        }
        if self.retry_delay < MIN_TIMEOUT {
            return Err(ConfigError::RetryDelayTooShort);
        }
        if !self.rate_limit_requests.is_finite() || self.rate_limit_requests <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(self.rate_limit_requests));
        }
        if self.rate_limit_burst == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        if self.tls.enabled && (self.tls.cert_file.is_none() || self.tls.key_file.is_none()) {
            return Err(ConfigError::MissingTlsCertificate);
        }
        Ok(())
    }

    /// Configured log level; unknown names fall back to `INFO`.
    pub fn log_level(&self) -> tracing::Level {
        match self.log_level.to_ascii_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: Option<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username;
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    pub fn with_default_queue(mut self, queue: impl Into<String>) -> Self {
        self.default_queue = queue.into();
        self
    }

    pub fn with_message_ttl(mut self, ttl: Duration) -> Self {
        self.message_ttl = ttl;
        self
    }

    pub fn with_ttl_mode(mut self, mode: TtlMode) -> Self {
        self.ttl_mode = mode;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_second: f64, burst: u32) -> Self {
        self.rate_limit_requests = requests_per_second;
        self.rate_limit_burst = burst;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

/// Parse a duration such as `300ms`, `5s`, `2m`, `24h` or `1h30m`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`; each component may
/// carry a decimal fraction. A bare `0` is zero.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input == "0" {
        return Some(Duration::ZERO);
    }
    if input.is_empty() {
        return None;
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = input;
    let mut nanos = 0f64;

    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let value: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number).unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        nanos += value * scale;
        rest = &rest[unit_end..];
    }

    Some(Duration::from_nanos(nanos.round() as u64))
}

/// Typed reads of prefixed variables, falling back to defaults.
struct EnvSource<F> {
    lookup: F,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<(String, String)> {
        let key = format!("{}{}", ENV_PREFIX, name);
        (self.lookup)(&key)
            .filter(|value| !value.is_empty())
            .map(|value| (key, value))
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.raw(name).map(|(_, value)| value)
    }

    fn string(&self, name: &str, default: String) -> String {
        self.optional(name).unwrap_or(default)
    }

    fn parsed<T: FromStr>(&self, name: &str, default: T) -> T {
        self.read(name, default, |value| value.trim().parse().ok())
    }

    fn duration(&self, name: &str, default: Duration) -> Duration {
        self.read(name, default, parse_duration)
    }

    fn boolean(&self, name: &str, default: bool) -> bool {
        self.read(name, default, |value| match value.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
            _ => None,
        })
    }

    fn ttl_mode(&self, name: &str, default: TtlMode) -> TtlMode {
        self.read(name, default, |value| {
            match value.trim().to_ascii_lowercase().as_str() {
                "sliding" => Some(TtlMode::Sliding),
                "set-if-absent" | "nx" => Some(TtlMode::SetIfAbsent),
                _ => None,
            }
        })
    }

    fn read<T>(&self, name: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> T {
        let Some((key, value)) = self.raw(name) else {
            return default;
        };
        match parse(&value) {
            Some(parsed) => parsed,
            None => {
                warn!(env_var = %key, value = %value, "Invalid value, using default");
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{}{}", ENV_PREFIX, k), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = SenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.address, "localhost:6379");
        assert_eq!(config.default_queue, "user-registrations");
        assert_eq!(config.message_ttl, Duration::from_secs(86_400));
        assert_eq!(config.breaker.max_requests, 5);
        assert_eq!(config.breaker.interval, Duration::from_secs(120));
        assert_eq!(config.breaker.timeout, Duration::from_secs(60));
        assert_eq!(config.rate_limit_burst, 2000);
    }

    #[test]
    fn test_empty_environment_yields_defaults() {
        let config = SenderConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SenderConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = SenderConfig::from_lookup(lookup(&[
            ("ADDRESS", "redis.example.com:6380"),
            ("PASSWORD", "secret123"),
            ("DATABASE", "2"),
            ("DEFAULT_QUEUE", "custom-queue"),
            ("DIAL_TIMEOUT", "10s"),
            ("MESSAGE_TTL", "1h"),
            ("TTL_MODE", "set-if-absent"),
            ("BREAKER_INTERVAL", "0"),
            ("RATE_LIMIT_REQUESTS", "12.5"),
        ]))
        .unwrap();

        assert_eq!(config.address, "redis.example.com:6380");
        assert_eq!(config.password.as_deref(), Some("secret123"));
        assert_eq!(config.username, None);
        assert_eq!(config.database, 2);
        assert_eq!(config.default_queue, "custom-queue");
        assert_eq!(config.dial_timeout, Duration::from_secs(10));
        assert_eq!(config.message_ttl, Duration::from_secs(3600));
        assert_eq!(config.ttl_mode, TtlMode::SetIfAbsent);
        assert_eq!(config.breaker.interval, Duration::ZERO);
        assert_eq!(config.rate_limit_requests, 12.5);
    }

    #[test]
    fn test_malformed_values_fall_back_to_defaults() {
        let config = SenderConfig::from_lookup(lookup(&[
            ("DATABASE", "two"),
            ("READ_TIMEOUT", "soon"),
            ("TLS_ENABLED", "maybe"),
            ("POOL_SIZE", "-1"),
        ]))
        .unwrap();

        assert_eq!(config.database, 0);
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert!(!config.tls.enabled);
        assert_eq!(config.pool_size, 10);
    }

    #[test]
    fn test_tls_requires_certificate_and_key() {
        let err = SenderConfig::from_lookup(lookup(&[("TLS_ENABLED", "true")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingTlsCertificate);

        let config = SenderConfig::from_lookup(lookup(&[
            ("TLS_ENABLED", "true"),
            ("TLS_CERT_FILE", "/path/to/cert.pem"),
            ("TLS_KEY_FILE", "/path/to/key.pem"),
        ]))
        .unwrap();
        assert!(config.tls.enabled);
        assert_eq!(config.tls.cert_file, Some(PathBuf::from("/path/to/cert.pem")));
    }

    #[test]
    fn test_invalid_database_is_rejected() {
        let err = SenderConfig::from_lookup(lookup(&[("DATABASE", "16")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidDatabase(16));
    }

    #[test]
    fn test_validation_rejects_each_field() {
        let cases: Vec<(SenderConfig, ConfigError)> = vec![
            (
                SenderConfig::default().with_address(""),
                ConfigError::EmptyAddress,
            ),
            (
                SenderConfig {
                    write_timeout: Duration::ZERO,
                    ..SenderConfig::default()
                },
                ConfigError::TimeoutTooShort("write timeout"),
            ),
            (
                SenderConfig {
                    pool_size: 0,
                    min_idle_conns: 0,
                    ..SenderConfig::default()
                },
                ConfigError::ZeroPoolSize,
            ),
            (
                SenderConfig {
                    pool_size: 2,
                    min_idle_conns: 3,
                    ..SenderConfig::default()
                },
                ConfigError::MinIdleExceedsPool {
                    min_idle: 3,
                    pool_size: 2,
                },
            ),
            (
                SenderConfig::default().with_default_queue(""),
                ConfigError::EmptyDefaultQueue,
            ),
            (
                SenderConfig::default().with_message_ttl(Duration::from_millis(999)),
                ConfigError::TtlTooShort,
            ),
            (
                SenderConfig::default().with_message_ttl(Duration::MAX),
                ConfigError::TtlTooLong,
            ),
            (
                SenderConfig {
                    retry_delay: Duration::ZERO,
                    ..SenderConfig::default()
                },
                ConfigError::RetryDelayTooShort,
            ),
            (
                SenderConfig::default().with_rate_limit(0.0, 10),
                ConfigError::InvalidRateLimit(0.0),
            ),
            (
                SenderConfig::default().with_rate_limit(10.0, 0),
                ConfigError::ZeroBurst,
            ),
        ];

        for (config, expected) in cases {
            assert_eq!(config.validate(), Err(expected));
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5_400)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1_500)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("5 days"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_log_level() {
        assert_eq!(SenderConfig::default().log_level(), tracing::Level::INFO);
        assert_eq!(
            SenderConfig::default().with_log_level("debug").log_level(),
            tracing::Level::DEBUG
        );
        assert_eq!(
            SenderConfig::default().with_log_level("verbose").log_level(),
            tracing::Level::INFO
        );
    }
}
