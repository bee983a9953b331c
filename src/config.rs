use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_ORDER_CODE_PREFIX: &str = "ORD";
const DEFAULT_REDUCED_TAX_CATEGORIES: &str = "food,thực phẩm";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key (minimum 64 characters)
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Expected `iss` claim of bearer tokens
    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    /// Expected `aud` claim of bearer tokens
    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Whole-request timeout applied by the HTTP layer (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Tax policy of record: "flat" or "category"
    #[serde(default = "default_tax_policy")]
    #[validate(custom = "validate_tax_policy")]
    pub tax_policy: String,

    /// Flat tax rate (as decimal, e.g., 0.08 for 8%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub default_tax_rate: f64,

    /// Category policy: rate for categories matching `reduced_tax_categories`
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub reduced_tax_rate: f64,

    /// Category policy: rate for every other category
    #[serde(default = "default_standard_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub standard_tax_rate: f64,

    /// Comma-separated category name fragments that attract the reduced rate
    #[serde(default = "default_reduced_tax_categories")]
    pub reduced_tax_categories: String,

    /// Decimal places of the smallest currency unit (0 for VND)
    #[serde(default)]
    #[validate(range(max = 4))]
    pub currency_minor_units: u32,

    /// Prefix of generated order codes
    #[serde(default = "default_order_code_prefix")]
    #[validate(length(min = 1, max = 8))]
    pub order_code_prefix: String,

    /// Candidate codes tried before giving up with CodeGenerationExhausted
    #[serde(default = "default_order_code_max_attempts")]
    #[validate(range(min = 1, max = 50))]
    pub order_code_max_attempts: u32,

    /// Upper bound for one order-creation unit of work (seconds)
    #[serde(default = "default_order_timeout_secs")]
    #[validate(range(min = 1))]
    pub order_timeout_secs: u64,

    /// Compare-and-swap retries per lot before allocation reports Busy
    #[serde(default = "default_allocation_max_retries")]
    #[validate(range(min = 1, max = 100))]
    pub allocation_max_retries: u32,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Default page size for paginated API responses
    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u64,

    /// Maximum page size allowed for paginated API responses
    #[serde(default = "default_api_max_page_size")]
    pub api_max_page_size: u64,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            tax_policy: default_tax_policy(),
            default_tax_rate: default_tax_rate(),
            reduced_tax_rate: default_tax_rate(),
            standard_tax_rate: default_standard_tax_rate(),
            reduced_tax_categories: default_reduced_tax_categories(),
            currency_minor_units: 0,
            order_code_prefix: default_order_code_prefix(),
            order_code_max_attempts: default_order_code_max_attempts(),
            order_timeout_secs: default_order_timeout_secs(),
            allocation_max_retries: default_allocation_max_retries(),
            event_channel_capacity: default_event_channel_capacity(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Category name fragments attracting the reduced tax rate, lowercased
    pub fn reduced_tax_keywords(&self) -> Vec<String> {
        self.reduced_tax_categories
            .split(',')
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET to a unique, secure value."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.api_default_page_size == 0 || self.api_default_page_size > self.api_max_page_size
        {
            let mut err = ValidationError::new("api_default_page_size");
            err.message = Some("api_default_page_size must be between 1 and api_max_page_size".into());
            errors.add("api_default_page_size", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_request_timeout_secs() -> u64 {
    30
}

fn default_tax_policy() -> String {
    "flat".to_string()
}

fn default_tax_rate() -> f64 {
    0.08
}

fn default_standard_tax_rate() -> f64 {
    0.10
}

fn default_reduced_tax_categories() -> String {
    DEFAULT_REDUCED_TAX_CATEGORIES.to_string()
}

fn default_order_code_prefix() -> String {
    DEFAULT_ORDER_CODE_PREFIX.to_string()
}

fn default_order_code_max_attempts() -> u32 {
    5
}

fn default_order_timeout_secs() -> u64 {
    10
}

fn default_allocation_max_retries() -> u32 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_api_page_size() -> u64 {
    20
}

fn default_api_max_page_size() -> u64 {
    100
}

fn default_auth_issuer() -> String {
    "shopstock-auth".to_string()
}

fn default_auth_audience() -> String {
    "shopstock-api".to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_tax_policy(policy: &str) -> Result<(), ValidationError> {
    match policy.to_ascii_lowercase().as_str() {
        "flat" | "category" => Ok(()),
        _ => {
            let mut err = ValidationError::new("tax_policy");
            err.message = Some("Must be one of: flat, category".into());
            Err(err)
        }
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    const DISALLOWED: [&str; 3] = [
        "CHANGE_THIS_SECRET_IN_PRODUCTION",
        "your-secret-key",
        "default-secret-key",
    ];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("tax rates must be finite values between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("shopstock_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret has no default and must come from a file or APP__JWT_SECRET.
    let config = Config::builder()
        .set_default("database_url", "sqlite://shopstock.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET (minimum 64 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "a7Kq2Zp9Lm4Xw8Rt1Vb6Ny3Hc5Jd0Fg-unit-test-secret-with-enough-entropy-0192".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn defaults_pass_field_validation() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tax_policy, "flat");
        assert_eq!(cfg.default_tax_rate, 0.08);
        assert_eq!(cfg.order_code_prefix, "ORD");
    }

    #[test]
    fn unknown_tax_policy_is_rejected() {
        let mut cfg = base_config();
        cfg.tax_policy = "progressive".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("tax_policy"));
    }

    #[test]
    fn tax_rate_above_one_is_rejected() {
        let mut cfg = base_config();
        cfg.standard_tax_rate = 1.5;
        cfg.reduced_tax_rate = -0.1;
        let errors = cfg.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("standard_tax_rate"));
        assert!(fields.contains_key("reduced_tax_rate"));
        assert!(!fields.contains_key("default_tax_rate"));
    }

    #[test]
    fn reduced_keywords_are_trimmed_and_lowercased() {
        let mut cfg = base_config();
        cfg.reduced_tax_categories = " Food , ,Bakery".into();
        assert_eq!(cfg.reduced_tax_keywords(), vec!["food", "bakery"]);
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }
}
