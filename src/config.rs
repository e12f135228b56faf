//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Authorization
//!
//! - `REDIS_URL`: Token and role store (default: `redis://127.0.0.1:6379`)
//! - `TOKEN_KEY_PREFIX`: Prefix of token keys (default: `auth:`)
//! - `RESOURCE_ROLES_KEY`: Hash holding path → roles (default: `AUTH:RESOURCE_ROLES_MAP`)
//! - `AUTHORITY_PREFIX`: Prefix applied to required roles (default: `ROLE_`)
//! - `AUTH_IGNORE_URLS`: Whitelist that skips authorization (default: `/health,/ready,/oauth2/**`)
//!
//! # Audit
//!
//! - `AUDIT_EXEMPT_PATHS`: Exact paths never audited (default: `/oauth2/oauth/check_token`)
//! - `AUDIT_EXEMPT_FRAGMENTS`: Path fragments never audited (default: `/v3/api-docs`)
//! - `AUDIT_RESPONSE_BODY_LIMIT`: Max captured response bytes (default: 1 MiB)
//!
//! # Upstream
//!
//! - `ROUTES`: `id=/prefix=http://host:port` entries separated by `;`
//! - `UPSTREAM_TIMEOUT_SECS`: Upstream request timeout (default: 30)

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::gateway::RouteDefinition;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, one line per event
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Gateway will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    // =========================================================================
    // Store Configuration
    // =========================================================================
    /// Redis connection URL shared by the token and role stores
    pub redis_url: String,

    /// Key prefix under which access tokens are stored
    pub token_key_prefix: String,

    /// Redis hash mapping request paths to required roles
    pub resource_roles_key: String,

    /// Interval for the background store connectivity check
    pub health_check_interval: Duration,

    // =========================================================================
    // Authorization Configuration
    // =========================================================================
    /// Prefix prepended to every required role before comparison
    pub authority_prefix: String,

    /// Paths that skip authorization. Exact paths, or prefixes ending in `/**`.
    pub auth_ignore_urls: Vec<String>,

    // =========================================================================
    // Audit Configuration
    // =========================================================================
    /// Paths excluded from auditing by exact match
    pub audit_exempt_paths: Vec<String>,

    /// Paths excluded from auditing when they contain one of these fragments
    pub audit_exempt_fragments: Vec<String>,

    /// Maximum number of response bytes captured into an audit record.
    /// Larger JSON responses stream through and the record is truncated.
    pub audit_response_body_limit: usize,

    /// Maximum request body size in bytes (default: 10MB).
    /// Also bounds how much a captured request body may buffer.
    pub max_request_body_size: usize,

    // =========================================================================
    // Upstream Configuration
    // =========================================================================
    /// Static route table used by the forwarder
    pub routes: Vec<RouteDefinition>,

    /// Timeout for a single upstream exchange
    pub upstream_timeout: Duration,

    /// Trusted proxy CIDR ranges. Used to flag client IP headers that did
    /// not pass through a known proxy.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (trust all sources)
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Log output format (`LOG_FORMAT=json` for JSON lines)
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any configuration value is invalid
    /// (e.g., non-numeric PORT value, malformed route entry).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or(defaults.host),
            port: Self::parse_env("PORT", defaults.port)?,

            // Stores
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            token_key_prefix: env::var("TOKEN_KEY_PREFIX").unwrap_or(defaults.token_key_prefix),
            resource_roles_key: env::var("RESOURCE_ROLES_KEY")
                .unwrap_or(defaults.resource_roles_key),
            health_check_interval: Duration::from_secs(Self::parse_env(
                "HEALTH_CHECK_INTERVAL_SECS",
                30,
            )?),

            // Authorization
            authority_prefix: env::var("AUTHORITY_PREFIX").unwrap_or(defaults.authority_prefix),
            auth_ignore_urls: Self::parse_paths("AUTH_IGNORE_URLS", "/health,/ready,/oauth2/**"),

            // Audit
            audit_exempt_paths: Self::parse_paths(
                "AUDIT_EXEMPT_PATHS",
                "/oauth2/oauth/check_token",
            ),
            audit_exempt_fragments: Self::parse_list("AUDIT_EXEMPT_FRAGMENTS", "/v3/api-docs"),
            audit_response_body_limit: Self::parse_env(
                "AUDIT_RESPONSE_BODY_LIMIT",
                defaults.audit_response_body_limit,
            )?,
            max_request_body_size: Self::parse_env(
                "MAX_REQUEST_BODY_SIZE",
                defaults.max_request_body_size,
            )?,

            // Upstream
            routes: RouteDefinition::parse_list(&env::var("ROUTES").unwrap_or_default())?,
            upstream_timeout: Duration::from_secs(Self::parse_env("UPSTREAM_TIMEOUT_SECS", 30)?),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES", ""),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default()),
            metrics_port: Self::parse_env("METRICS_PORT", defaults.metrics_port)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if self.audit_response_body_limit == 0 {
            return Err(AppError::ConfigError(
                "AUDIT_RESPONSE_BODY_LIMIT must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.upstream_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "UPSTREAM_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.health_check_interval.is_zero() {
            return Err(AppError::ConfigError(
                "HEALTH_CHECK_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for route in &self.routes {
            if !seen.insert(route.id.as_str()) {
                return Err(AppError::ConfigError(format!(
                    "Duplicate route id in ROUTES: {}",
                    route.id
                )));
            }
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma separated list, trimming entries and dropping blanks.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
    }

    /// Like [`Self::parse_list`], keeping only entries that look like paths.
    fn parse_paths(name: &str, default: &str) -> Vec<String> {
        Self::parse_list(name, default)
            .into_iter()
            .filter(|p| p.starts_with('/'))
            .collect()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 8080,
            // Stores
            redis_url: "redis://127.0.0.1:6379".to_string(),
            token_key_prefix: "auth:".to_string(),
            resource_roles_key: "AUTH:RESOURCE_ROLES_MAP".to_string(),
            health_check_interval: Duration::from_secs(30),
            // Authorization
            authority_prefix: "ROLE_".to_string(),
            auth_ignore_urls: vec![
                "/health".to_string(),
                "/ready".to_string(),
                "/oauth2/**".to_string(),
            ],
            // Audit
            audit_exempt_paths: vec!["/oauth2/oauth/check_token".to_string()],
            audit_exempt_fragments: vec!["/v3/api-docs".to_string()],
            audit_response_body_limit: 1024 * 1024, // 1MB
            max_request_body_size: 10 * 1024 * 1024, // 10MB
            // Upstream
            routes: Vec::new(),
            upstream_timeout: Duration::from_secs(30),
            trusted_proxies: Vec::new(),
            // Observability
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.port, 8080);
        assert_eq!(config.authority_prefix, "ROLE_");
        assert_eq!(config.audit_response_body_limit, 1024 * 1024);
        assert!(
            config
                .audit_exempt_fragments
                .contains(&"/v3/api-docs".to_string())
        );
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_metrics_addr_disabled() {
        let config = Config {
            metrics_port: 0,
            ..Config::default()
        };
        assert!(config.metrics_addr().is_none());
    }

    #[test]
    fn test_validate_zero_response_limit() {
        let config = Config {
            audit_response_body_limit: 0,
            ..Config::default()
        };

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("AUDIT_RESPONSE_BODY_LIMIT")
        );
    }

    #[test]
    fn test_validate_duplicate_route_ids() {
        let config = Config {
            routes: RouteDefinition::parse_list(
                "orders=/orders=http://a:1;orders=/orders2=http://b:2",
            )
            .unwrap(),
            ..Config::default()
        };

        assert!(config.validate().unwrap_err().to_string().contains("orders"));
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_split_list_trims_and_drops_blanks() {
        assert_eq!(split_list(" /a , ,/b,"), vec!["/a", "/b"]);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
    }
}
