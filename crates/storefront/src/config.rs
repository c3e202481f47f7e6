//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STRIPE_SECRET_KEY` - Payment gateway secret API key
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STRIPE_API_BASE` - Gateway API base URL (default: <https://api.stripe.com>)
//! - `STRIPE_CURRENCY` - Settlement currency (default: usd)
//! - `PLATFORM_FEE_BPS` - Platform fee on split payments in basis points (default: 500 = 5%)
//! - `GATEWAY_TIMEOUT_SECS` - Per-request timeout for gateway calls (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Performance trace sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use localmart_core::CurrencyCode;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const MAX_FEE_BASIS_POINTS: u32 = 10_000;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Payment gateway configuration
    pub stripe: StripeConfig,
    /// Charge currency and marketplace fee
    pub payments: PaymentSettings,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "production", "staging")
    pub sentry_environment: Option<String>,
    /// Fraction of error events sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Payment gateway API configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (server-side only)
    pub secret_key: SecretString,
    /// API base URL, overridable for tests and proxies
    pub api_base: Url,
    /// Timeout applied to every gateway request
    pub timeout: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Settings that shape every payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentSettings {
    /// Currency all charges are made in
    pub currency: CurrencyCode,
    /// Platform fee retained on split payments, in basis points
    pub platform_fee_bps: u32,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::USD,
            platform_fee_bps: 500,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;

        let stripe = StripeConfig::from_env()?;
        let payments = PaymentSettings::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            stripe,
            payments,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_base = get_env_or_default("STRIPE_API_BASE", DEFAULT_STRIPE_API_BASE);
        let api_base = Url::parse(&api_base).map_err(|e| {
            ConfigError::InvalidEnvVar("STRIPE_API_BASE".to_string(), e.to_string())
        })?;
        let timeout_secs: u64 = parse_env("GATEWAY_TIMEOUT_SECS", "30")?;

        Ok(Self {
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            api_base,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl PaymentSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let currency = get_env_or_default("STRIPE_CURRENCY", "usd")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("STRIPE_CURRENCY".to_string(), e.to_string()))?;

        let platform_fee_bps: u32 = parse_env("PLATFORM_FEE_BPS", "500")?;
        if platform_fee_bps > MAX_FEE_BASIS_POINTS {
            return Err(ConfigError::InvalidEnvVar(
                "PLATFORM_FEE_BPS".to_string(),
                format!("must be at most {MAX_FEE_BASIS_POINTS} (got {platform_fee_bps})"),
            ));
        }

        Ok(Self {
            currency,
            platform_fee_bps,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by hosted Postgres attach).
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` naming the primary key if neither is set.
pub fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    // Try primary key first (e.g., STOREFRONT_DATABASE_URL)
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Real API keys have high entropy
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the gateway dashboard."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("sk_live_your-key-here", "STRIPE_SECRET_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_gateway_key() {
        let result = validate_secret_strength(
            "sk_test_51HqLyjWDarjtT1zdp7dcXsb4qFnC9gKhOqUv2RZ",
            "STRIPE_SECRET_KEY",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_default_payment_settings() {
        let settings = PaymentSettings::default();
        assert_eq!(settings.currency, CurrencyCode::USD);
        assert_eq!(settings.platform_fee_bps, 500);
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            stripe: StripeConfig {
                secret_key: SecretString::from("sk_test_abc"),
                api_base: Url::parse(DEFAULT_STRIPE_API_BASE).unwrap(),
                timeout: Duration::from_secs(30),
            },
            payments: PaymentSettings::default(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_stripe_config_debug_redacts_secret() {
        let config = StripeConfig {
            secret_key: SecretString::from("sk_live_super_secret_value"),
            api_base: Url::parse(DEFAULT_STRIPE_API_BASE).unwrap(),
            timeout: Duration::from_secs(30),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("api.stripe.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_value"));
    }
}
