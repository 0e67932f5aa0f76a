//! # Configuration
//!
//! Deployment configuration for Tradebook.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TRADEBOOK_NUMBERING=per_shop_customer                              │
//! │     TRADEBOOK_VAT_PCT=16.5                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tradebook/tradebook.toml (Linux)                         │
//! │     ~/Library/Application Support/com.tradebook.tradebook/... (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     monthly numbering, no levy, 0% VAT, 30 day terms                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/tradebook/tradebook.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [invoicing]
//! numbering = "monthly"          # monthly | per_shop_customer
//! default_levy_pct = "1"
//! default_vat_pct = "16.5"
//! payment_terms_days = 30
//! allow_negative_stock = true
//! max_retries = 5
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use tradebook_core::numbering::NumberingStrategy;
use tradebook_core::validation::{parse_percentage, ValidationResult};
use tradebook_core::LevyConfig;

use crate::pool::DbConfig;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config file: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No config path available")]
    NoConfigPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl DatabaseSettings {
    /// Resolved database file path.
    pub fn database_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "tradebook", "tradebook")
                .map(|dirs| dirs.data_dir().join("tradebook.db"))
                .unwrap_or_else(|| PathBuf::from("tradebook.db"))
        })
    }

    /// Pool configuration for these settings.
    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path())
            .max_connections(self.max_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

// =============================================================================
// Invoicing Settings
// =============================================================================

/// Business rules that vary per deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicingSettings {
    #[serde(default)]
    pub numbering: NumberingStrategy,

    /// Levy percentage used when a form leaves it blank.
    #[serde(default)]
    pub default_levy_pct: Decimal,

    /// VAT percentage used when a form leaves it blank.
    #[serde(default)]
    pub default_vat_pct: Decimal,

    /// Days after the issue date an invoice falls due when no due date is given.
    #[serde(default = "default_payment_terms_days")]
    pub payment_terms_days: u32,

    /// When false, dispatch that would take stock below zero is refused.
    #[serde(default = "default_true")]
    pub allow_negative_stock: bool,

    /// Extra attempts after the first for a retryable invoice transaction.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_payment_terms_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    20
}

fn default_max_backoff() -> u64 {
    500
}

impl Default for InvoicingSettings {
    fn default() -> Self {
        InvoicingSettings {
            numbering: NumberingStrategy::default(),
            default_levy_pct: Decimal::ZERO,
            default_vat_pct: Decimal::ZERO,
            payment_terms_days: default_payment_terms_days(),
            allow_negative_stock: default_true(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl InvoicingSettings {
    /// Default levy/VAT rates for forms that leave them blank.
    pub fn levy_defaults(&self) -> ValidationResult<LevyConfig> {
        let levy_rate = parse_percentage("default_levy_pct", &self.default_levy_pct.to_string())?;
        let vat_rate = parse_percentage("default_vat_pct", &self.default_vat_pct.to_string())?;

        Ok(LevyConfig {
            apply_levy: false,
            levy_rate,
            vat_rate,
        })
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// =============================================================================
// Tradebook Config
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradebookConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub invoicing: InvoicingSettings,
}

impl TradebookConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tradebook.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading tradebook config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Tradebook config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        self.invoicing
            .levy_defaults()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.invoicing.initial_backoff_ms > self.invoicing.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "invoicing.initial_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    /// Applies `TRADEBOOK_*` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("TRADEBOOK_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(raw) = lookup("TRADEBOOK_DB_MAX_CONNECTIONS") {
            match raw.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %raw, "Ignoring invalid TRADEBOOK_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(raw) = lookup("TRADEBOOK_NUMBERING") {
            match raw.parse::<NumberingStrategy>() {
                Ok(strategy) => {
                    debug!(strategy = %strategy, "Overriding numbering strategy from environment");
                    self.invoicing.numbering = strategy;
                }
                Err(_) => warn!(value = %raw, "Unknown numbering strategy in environment"),
            }
        }

        if let Some(raw) = lookup("TRADEBOOK_LEVY_PCT") {
            match raw.trim().parse::<Decimal>() {
                Ok(pct) => self.invoicing.default_levy_pct = pct,
                Err(_) => warn!(value = %raw, "Ignoring invalid TRADEBOOK_LEVY_PCT"),
            }
        }

        if let Some(raw) = lookup("TRADEBOOK_VAT_PCT") {
            match raw.trim().parse::<Decimal>() {
                Ok(pct) => self.invoicing.default_vat_pct = pct,
                Err(_) => warn!(value = %raw, "Ignoring invalid TRADEBOOK_VAT_PCT"),
            }
        }

        if let Some(raw) = lookup("TRADEBOOK_PAYMENT_TERMS_DAYS") {
            match raw.parse::<u32>() {
                Ok(days) => self.invoicing.payment_terms_days = days,
                Err(_) => warn!(value = %raw, "Ignoring invalid TRADEBOOK_PAYMENT_TERMS_DAYS"),
            }
        }

        if let Some(raw) = lookup("TRADEBOOK_ALLOW_NEGATIVE_STOCK") {
            match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.invoicing.allow_negative_stock = true,
                "0" | "false" | "no" => self.invoicing.allow_negative_stock = false,
                _ => warn!(value = %raw, "Ignoring invalid TRADEBOOK_ALLOW_NEGATIVE_STOCK"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tradebook", "tradebook")
            .map(|dirs| dirs.config_dir().join("tradebook.toml"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = TradebookConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.invoicing.numbering, NumberingStrategy::Monthly);
        assert!(config.invoicing.allow_negative_stock);
        assert_eq!(config.invoicing.payment_terms_days, 30);
    }

    #[test]
    fn test_parse_toml() {
        let config = TradebookConfig::from_toml(
            r#"
            [database]
            path = "/tmp/tb.db"
            busy_timeout_ms = 250

            [invoicing]
            numbering = "per_shop_customer"
            default_levy_pct = "1"
            default_vat_pct = "16.5"
            allow_negative_stock = false
            "#,
        )
        .unwrap();

        assert_eq!(config.database.database_path(), PathBuf::from("/tmp/tb.db"));
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.invoicing.numbering, NumberingStrategy::PerShopCustomer);
        assert!(!config.invoicing.allow_negative_stock);

        let levy = config.invoicing.levy_defaults().unwrap();
        assert_eq!(levy.levy_rate.bps(), 100);
        assert_eq!(levy.vat_rate.bps(), 1650);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TRADEBOOK_NUMBERING", "per-shop-customer"),
            ("TRADEBOOK_VAT_PCT", "15"),
            ("TRADEBOOK_ALLOW_NEGATIVE_STOCK", "no"),
            ("TRADEBOOK_PAYMENT_TERMS_DAYS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = TradebookConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.invoicing.numbering, NumberingStrategy::PerShopCustomer);
        assert_eq!(config.invoicing.default_vat_pct, dec!(15));
        assert!(!config.invoicing.allow_negative_stock);
        assert_eq!(config.invoicing.payment_terms_days, 30);
    }

    #[test]
    fn test_validate_rejects_bad_rates() {
        let mut config = TradebookConfig::default();
        config.invoicing.default_vat_pct = dec!(120);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = TradebookConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
