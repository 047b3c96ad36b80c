use serde::{Deserialize, Serialize};

use crate::account::auth::PasswordHashing;
use crate::error::ConfigError;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub registration: RegistrationPolicy,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Namespace the account and audit tables live in.
    #[serde(default = "default_login_database")]
    pub login_database: String,
}

/// Self-service registration rules. Lengths are measured in bytes.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegistrationPolicy {
    #[serde(default = "default_min_username_length")]
    pub min_username_length: usize,
    #[serde(default = "default_max_username_length")]
    pub max_username_length: usize,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    #[serde(default = "default_max_password_length")]
    pub max_password_length: usize,
    #[serde(default)]
    pub use_captcha: bool,
    #[serde(default)]
    pub allow_duplicate_emails: bool,
    #[serde(default = "default_account_create_table")]
    pub account_create_table: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub password_hashing: PasswordHashing,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_storage_path() -> String {
    "./data/login".to_string()
}

fn default_login_database() -> String {
    "ragnarok".to_string()
}

fn default_min_username_length() -> usize {
    4
}

fn default_max_username_length() -> usize {
    23
}

fn default_min_password_length() -> usize {
    8
}

fn default_max_password_length() -> usize {
    31
}

fn default_account_create_table() -> String {
    "cp_createlog".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            login_database: default_login_database(),
        }
    }
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            min_username_length: default_min_username_length(),
            max_username_length: default_max_username_length(),
            min_password_length: default_min_password_length(),
            max_password_length: default_max_password_length(),
            use_captcha: false,
            allow_duplicate_emails: false,
            account_create_table: default_account_create_table(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    /// Read and validate a config file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file is created with the default contents
    /// and those defaults are returned. A file that exists but does not parse
    /// or validate is an error, never silently replaced by defaults.
    pub fn load_or_create(path: &str) -> Result<Self, ConfigError> {
        if std::path::Path::new(path).exists() {
            return Self::load(path);
        }
        let config = Self::default();
        let contents = toml::to_string_pretty(&config).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_string(),
            source,
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let reg = &self.registration;
        if reg.min_username_length > reg.max_username_length {
            return Err(ConfigError::Invalid(format!(
                "min_username_length ({}) exceeds max_username_length ({})",
                reg.min_username_length, reg.max_username_length
            )));
        }
        if reg.min_password_length > reg.max_password_length {
            return Err(ConfigError::Invalid(format!(
                "min_password_length ({}) exceeds max_password_length ({})",
                reg.min_password_length, reg.max_password_length
            )));
        }
        check_identifier("storage.login_database", &self.storage.login_database)?;
        check_identifier("registration.account_create_table", &reg.account_create_table)?;
        Ok(())
    }
}

// Table names are spliced into store keys, so only plain identifiers are allowed.
fn check_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Invalid(format!(
            "{} must be a non-empty identifier of [A-Za-z0-9_], got '{}'",
            field, value
        )));
    }
    Ok(())
}
