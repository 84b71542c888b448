//! API Configuration Module
//!
//! Runtime settings for the HTTP layer: environment mode, bind address, CORS,
//! rate limiting, cookies, and the knobs on the serving workflows. Values are
//! read once from environment variables at startup; everything has a default
//! suitable for local development.

use std::time::Duration;

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse `SIGNWALL_ENVIRONMENT`. Anything other than production/prod is
    /// development.
    pub fn from_env() -> Self {
        match std::env::var("SIGNWALL_ENVIRONMENT") {
            Ok(value) if matches!(value.to_lowercase().as_str(), "production" | "prod") => {
                Environment::Production
            }
            _ => Environment::Development,
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub environment: Environment,

    /// Host to bind, `0.0.0.0` by default.
    pub bind_host: String,
    pub port: u16,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed origins. Entries may contain one `*` wildcard, e.g.
    /// `https://*.example.com` or `http://localhost:*`. A bare `*.example.com`
    /// matches https subdomains. Empty allows every origin (development only).
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials (the session cookie) cross-origin.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    pub rate_limit_enabled: bool,

    /// Requests per window, per client IP and route.
    pub rate_limit_per_window: u32,
    pub rate_limit_window: Duration,

    /// Sign attempts per window, per session.
    pub sign_limit_per_window: u32,
    pub sign_limit_window: Duration,

    // ========================================================================
    // Sessions and upstreams
    // ========================================================================
    /// Add `Secure` to the session cookie.
    pub cookie_secure: bool,

    /// Timeout applied to every outbound HTTP call.
    pub upstream_timeout: Duration,

    /// How long a successful identity lookup may be reused for the same
    /// access token. Zero disables the cache; a revoked token is noticed at
    /// most this long after revocation.
    pub user_cache_ttl: Duration,

    /// Collapse concurrent banner regenerations into one renderer call.
    pub render_single_flight: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            bind_host: "0.0.0.0".to_string(),
            port: 3000,

            cors_origins: Vec::new(),
            cors_allow_credentials: true,
            cors_max_age_secs: 86400,

            rate_limit_enabled: true,
            rate_limit_per_window: 15,
            rate_limit_window: Duration::from_secs(10),
            sign_limit_per_window: 2,
            sign_limit_window: Duration::from_secs(300),

            cookie_secure: false,
            upstream_timeout: Duration::from_secs(10),
            user_cache_ttl: Duration::ZERO,
            render_single_flight: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// - `SIGNWALL_ENVIRONMENT`: production|development
    /// - `SIGNWALL_API_BIND`, `SIGNWALL_API_PORT` (or `PORT`)
    /// - `SIGNWALL_CORS_ORIGINS`: comma-separated, wildcards allowed
    /// - `SIGNWALL_CORS_ALLOW_CREDENTIALS`, `SIGNWALL_CORS_MAX_AGE_SECS`
    /// - `SIGNWALL_RATE_LIMIT_ENABLED`, `SIGNWALL_RATE_LIMIT_PER_WINDOW`,
    ///   `SIGNWALL_RATE_LIMIT_WINDOW_SECS`
    /// - `SIGNWALL_SIGN_LIMIT_PER_WINDOW`, `SIGNWALL_SIGN_LIMIT_WINDOW_SECS`
    /// - `SIGNWALL_COOKIE_SECURE` (defaults to true in production)
    /// - `SIGNWALL_UPSTREAM_TIMEOUT_SECS`, `SIGNWALL_USER_CACHE_TTL_SECS`
    /// - `SIGNWALL_RENDER_SINGLE_FLIGHT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let environment = Environment::from_env();
        let production = environment == Environment::Production;

        let cors_origins = std::env::var("SIGNWALL_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let port = env_parse("SIGNWALL_API_PORT")
            .or_else(|| env_parse("PORT"))
            .unwrap_or(defaults.port);

        Self {
            environment,
            bind_host: std::env::var("SIGNWALL_API_BIND").unwrap_or(defaults.bind_host),
            port,
            cors_origins,
            cors_allow_credentials: env_flag("SIGNWALL_CORS_ALLOW_CREDENTIALS")
                .unwrap_or(defaults.cors_allow_credentials),
            cors_max_age_secs: env_parse("SIGNWALL_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            rate_limit_enabled: std::env::var("SIGNWALL_RATE_LIMIT_ENABLED")
                .ok()
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(defaults.rate_limit_enabled),
            rate_limit_per_window: env_parse("SIGNWALL_RATE_LIMIT_PER_WINDOW")
                .unwrap_or(defaults.rate_limit_per_window),
            rate_limit_window: env_parse("SIGNWALL_RATE_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            sign_limit_per_window: env_parse("SIGNWALL_SIGN_LIMIT_PER_WINDOW")
                .unwrap_or(defaults.sign_limit_per_window),
            sign_limit_window: env_parse("SIGNWALL_SIGN_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sign_limit_window),
            cookie_secure: env_flag("SIGNWALL_COOKIE_SECURE").unwrap_or(production),
            upstream_timeout: env_parse("SIGNWALL_UPSTREAM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            user_cache_ttl: env_parse("SIGNWALL_USER_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.user_cache_ttl),
            render_single_flight: env_flag("SIGNWALL_RENDER_SINGLE_FLIGHT")
                .unwrap_or(defaults.render_single_flight),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// CAPTCHA is only enforced in production.
    pub fn captcha_required(&self) -> bool {
        self.is_production()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return !self.is_production();
        }
        self.cors_origins
            .iter()
            .any(|allowed| origin_matches(allowed, origin))
    }
}

fn origin_matches(allowed: &str, origin: &str) -> bool {
    if allowed == origin {
        return true;
    }
    // Bare `*.domain` means https subdomains of domain.
    if let Some(domain) = allowed.strip_prefix("*.") {
        return origin
            .strip_prefix("https://")
            .and_then(|host| host.strip_suffix(domain))
            .is_some_and(|sub| sub.ends_with('.') && sub.len() > 1 && !sub.contains('/'));
    }
    let Some((prefix, suffix)) = allowed.split_once('*') else {
        return false;
    };
    origin
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(suffix))
        .is_some_and(|middle| !middle.is_empty() && !middle.contains('/'))
}
