//! Checkout configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CHECKOUT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `CHECKOUT_BASE_URL` - Public URL the payment provider redirects back to
//! - `ORDER_SERVICE_URL` - Base URL of the order-validation service
//! - `PAYMENT_SERVICE_URL` - Base URL of the payment provider API
//! - `PAYMENT_SERVICE_API_KEY` - Payment provider secret key (high entropy)
//!
//! ## Optional
//! - `CHECKOUT_CURRENCY` - ISO 4217 currency code (default: USD)
//! - `GUEST_CART_TTL_SECS` - Guest cart lifetime (default: 7 days)
//! - `GUEST_CART_CAPACITY` - Maximum number of guest carts held (default: 10000)
//! - `SESSION_REFRESH_LEEWAY_SECS` - Refresh the session if it expires sooner (default: 60)
//! - `CART_SIGN_IN_POLICY` - `merge` (default) or `discard`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use danceflow_core::CurrencyCode;

use crate::cart::SignInPolicy;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_GUEST_CART_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_GUEST_CART_CAPACITY: u64 = 10_000;
const DEFAULT_REFRESH_LEEWAY_SECS: u64 = 60;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
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

/// Full checkout configuration.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Order-validation service endpoint
    pub order_service_url: Url,
    /// Payment provider configuration
    pub payment: PaymentConfig,
    /// Engine settings
    pub settings: CheckoutSettings,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Payment provider configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Payment API base URL
    pub service_url: Url,
    /// Payment API secret key
    pub api_key: SecretString,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("service_url", &self.service_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Non-secret settings consumed by the engine.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Public base URL for payment return links
    pub base_url: Url,
    /// Currency for every cart and order
    pub currency: CurrencyCode,
    /// How long an idle guest cart is kept
    pub guest_cart_ttl: Duration,
    /// Maximum number of guest carts held in memory
    pub guest_cart_capacity: u64,
    /// Sessions expiring within this window are refreshed before ordering
    pub refresh_leeway: Duration,
    /// What happens to a guest cart when the visitor signs in
    pub sign_in_policy: SignInPolicy,
}

impl CheckoutSettings {
    /// Settings with defaults for everything but the base URL.
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self {
            base_url,
            currency: CurrencyCode::USD,
            guest_cart_ttl: Duration::from_secs(DEFAULT_GUEST_CART_TTL_SECS),
            guest_cart_capacity: DEFAULT_GUEST_CART_CAPACITY,
            refresh_leeway: Duration::from_secs(DEFAULT_REFRESH_LEEWAY_SECS),
            sign_in_policy: SignInPolicy::Merge,
        }
    }

    /// Where the payment provider sends the buyer after paying.
    ///
    /// The provider substitutes `{CHECKOUT_SESSION_ID}` with its opaque
    /// payment-session identifier.
    #[must_use]
    pub fn success_url(&self) -> String {
        let mut url = self.base_url.clone();
        url.set_path("/checkout/success");
        format!("{url}?session_id={{CHECKOUT_SESSION_ID}}")
    }

    /// Where the payment provider sends the buyer after cancelling.
    #[must_use]
    pub fn cancel_url(&self) -> String {
        let mut url = self.base_url.clone();
        url.set_path("/cart");
        url.to_string()
    }
}

impl CheckoutConfig {
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

        let database_url = get_database_url("CHECKOUT_DATABASE_URL")?;
        let order_service_url = get_url("ORDER_SERVICE_URL")?;
        let payment = PaymentConfig {
            service_url: get_url("PAYMENT_SERVICE_URL")?,
            api_key: get_validated_secret("PAYMENT_SERVICE_API_KEY")?,
        };
        let settings = CheckoutSettings::from_env()?;

        Ok(Self {
            database_url,
            order_service_url,
            payment,
            settings,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Load only what database tooling needs.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if no database URL is set.
    pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
        let _ = dotenvy::dotenv();
        get_database_url("CHECKOUT_DATABASE_URL")
    }
}

impl CheckoutSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::new(get_url("CHECKOUT_BASE_URL")?);

        if let Some(currency) = get_optional_env("CHECKOUT_CURRENCY") {
            settings.currency = currency
                .parse()
                .map_err(|e| ConfigError::InvalidEnvVar("CHECKOUT_CURRENCY".to_string(), e))?;
        }
        settings.guest_cart_ttl = Duration::from_secs(get_u64_or_default(
            "GUEST_CART_TTL_SECS",
            DEFAULT_GUEST_CART_TTL_SECS,
        )?);
        settings.guest_cart_capacity =
            get_u64_or_default("GUEST_CART_CAPACITY", DEFAULT_GUEST_CART_CAPACITY)?;
        settings.refresh_leeway = Duration::from_secs(get_u64_or_default(
            "SESSION_REFRESH_LEEWAY_SECS",
            DEFAULT_REFRESH_LEEWAY_SECS,
        )?);
        if let Some(policy) = get_optional_env("CART_SIGN_IN_POLICY") {
            settings.sign_in_policy = parse_sign_in_policy(&policy)?;
        }

        Ok(settings)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_sign_in_policy(value: &str) -> Result<SignInPolicy, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "merge" => Ok(SignInPolicy::Merge),
        "discard" => Ok(SignInPolicy::Discard),
        other => Err(ConfigError::InvalidEnvVar(
            "CART_SIGN_IN_POLICY".to_string(),
            format!("expected 'merge' or 'discard', got '{other}'"),
        )),
    }
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable parsed as a URL.
fn get_url(key: &str) -> Result<Url, ConfigError> {
    let value = get_required_env(key)?;
    Url::parse(&value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
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
    std::env::var(key).ok()
}

/// Get an optional integer environment variable with a default value.
fn get_u64_or_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |value| {
        value
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
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
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
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

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated key."
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
