//! # Engine Configuration
//!
//! Configuration management for the costing engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     COSTING_DB_PATH=/var/lib/costing/costing.db                        │
//! │     COSTING_HIGH_EXPIRY_DAYS=21                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/engine/costing.toml (Linux)                              │
//! │     ~/Library/Application Support/com.costing.engine/costing.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     balanced weights, 30/90 day risk windows, 8/3 turnover             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # costing.toml
//! [database]
//! path = "/var/lib/costing/costing.db"
//! max_connections = 5
//!
//! [scoring]
//! expiry_horizon_days = 180
//! cost_optimization = { cost = 0.7, expiry = 0.2, quantity = 0.1 }
//!
//! [risk]
//! high_expiry_days = 30
//! medium_expiry_days = 90
//! cost_premium_percentage = 10.0
//!
//! [turnover]
//! high = 8.0
//! low = 3.0
//! lookback_days = 365
//!
//! [allocation]
//! default_basis = "by_value"
//! default_strategy = "balanced"
//! base_currency = "USD"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use costing_core::impact::TurnoverThresholds;
use costing_core::optimizer::{AllocationStrategy, OptimizerConfig, RiskThresholds, ScoringConfig};
use costing_core::{AllocationBasis, ValidationError};
use costing_db::DbConfig;

// =============================================================================
// Config Error
// =============================================================================

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range or contradicts another.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationError),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

/// Ledger database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Defaults to `costing.db` in the platform data
    /// directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle connection timeout (seconds).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How long a writer waits for the write lock (seconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,

    /// Apply pending migrations on connect.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_busy_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            busy_timeout_secs: default_busy_timeout(),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Allocation Settings
// =============================================================================

/// Defaults applied when a request leaves a choice open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSettings {
    /// Basis for cost sets that do not name one.
    #[serde(default)]
    pub default_basis: AllocationBasis,

    /// Strategy for optimizer requests that do not name one.
    #[serde(default)]
    pub default_strategy: AllocationStrategy,

    /// Currency of batch prices and inventory values. Cost sets in any other
    /// currency must carry an exchange rate.
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
}

fn default_base_currency() -> String {
    "USD".to_string()
}

impl Default for AllocationSettings {
    fn default() -> Self {
        AllocationSettings {
            default_basis: AllocationBasis::default(),
            default_strategy: AllocationStrategy::default(),
            base_currency: default_base_currency(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Optimizer strategy weights and expiry horizon.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Optimizer risk classification thresholds.
    #[serde(default)]
    pub risk: RiskThresholds,

    /// Cost impact analyzer turnover thresholds.
    #[serde(default)]
    pub turnover: TurnoverThresholds,

    #[serde(default)]
    pub allocation: AllocationSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (costing.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<PathBuf> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(path)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.scoring.validate()?;
        self.risk.validate()?;
        self.turnover.validate()?;

        if self.database.max_connections == 0 {
            return Err(ValidationError::must_be_positive("database.max_connections").into());
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ValidationError::Inconsistent {
                field: "database.min_connections".to_string(),
                reason: "must not exceed database.max_connections".to_string(),
            }
            .into());
        }

        let currency = &self.allocation.base_currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidFormat {
                field: "allocation.base_currency".to_string(),
                reason: "expected a three-letter ISO code such as USD".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("COSTING_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(max) = std::env::var("COSTING_MAX_CONNECTIONS") {
            if let Ok(m) = max.parse::<u32>() {
                self.database.max_connections = m;
            }
        }

        if let Ok(days) = std::env::var("COSTING_EXPIRY_HORIZON_DAYS") {
            if let Ok(d) = days.parse::<i64>() {
                debug!(days = d, "Overriding expiry horizon from environment");
                self.scoring.expiry_horizon_days = d;
            }
        }

        if let Ok(days) = std::env::var("COSTING_HIGH_EXPIRY_DAYS") {
            if let Ok(d) = days.parse::<i64>() {
                self.risk.high_expiry_days = d;
            }
        }

        if let Ok(days) = std::env::var("COSTING_MEDIUM_EXPIRY_DAYS") {
            if let Ok(d) = days.parse::<i64>() {
                self.risk.medium_expiry_days = d;
            }
        }

        if let Ok(pct) = std::env::var("COSTING_COST_PREMIUM_PCT") {
            if let Ok(p) = pct.parse::<f64>() {
                self.risk.cost_premium_percentage = p;
            }
        }

        if let Ok(ratio) = std::env::var("COSTING_HIGH_TURNOVER") {
            if let Ok(r) = ratio.parse::<f64>() {
                self.turnover.high = r;
            }
        }

        if let Ok(ratio) = std::env::var("COSTING_LOW_TURNOVER") {
            if let Ok(r) = ratio.parse::<f64>() {
                self.turnover.low = r;
            }
        }

        if let Ok(days) = std::env::var("COSTING_LOOKBACK_DAYS") {
            if let Ok(d) = days.parse::<i64>() {
                self.turnover.lookback_days = d;
            }
        }

        if let Ok(basis) = std::env::var("COSTING_DEFAULT_BASIS") {
            match basis.parse() {
                Ok(parsed) => {
                    debug!(basis = %basis, "Overriding default basis from environment");
                    self.allocation.default_basis = parsed;
                }
                Err(_) => warn!(basis = %basis, "Unknown allocation basis in environment"),
            }
        }

        if let Ok(strategy) = std::env::var("COSTING_DEFAULT_STRATEGY") {
            match strategy.parse() {
                Ok(parsed) => self.allocation.default_strategy = parsed,
                Err(_) => warn!(strategy = %strategy, "Unknown allocation strategy in environment"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "costing", "engine")
            .map(|dirs| dirs.config_dir().join("costing.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Resolves the database file, creating the platform data directory when
    /// no explicit path is configured.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        let dirs = directories::ProjectDirs::from("com", "costing", "engine")
            .ok_or(ConfigError::NoConfigDir)?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(data_dir.join("costing.db"))
    }

    /// Pool settings for a database at `path`.
    pub fn db_config(&self, path: impl Into<PathBuf>) -> DbConfig {
        DbConfig::new(path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(self.database.idle_timeout_secs))
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
            .run_migrations(self.database.run_migrations)
    }

    /// Scoring and risk settings as the optimizer takes them.
    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            scoring: self.scoring.clone(),
            risk: self.risk.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.risk.high_expiry_days, 30);
        assert_eq!(config.turnover.lookback_days, 365);
        assert_eq!(config.allocation.default_strategy, AllocationStrategy::Balanced);
        assert_eq!(config.allocation.base_currency, "USD");
        assert!(config.database.run_migrations);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [risk]
            high_expiry_days = 14

            [allocation]
            default_basis = "by_weight"
            "#,
        )
        .unwrap();

        assert_eq!(config.risk.high_expiry_days, 14);
        assert_eq!(config.risk.medium_expiry_days, 90);
        assert_eq!(config.allocation.default_basis, AllocationBasis::ByWeight);
        assert_eq!(config.scoring.expiry_horizon_days, 180);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.risk.medium_expiry_days = 10;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.risk.medium_expiry_days = 90;
        config.turnover.low = 9.0;
        assert!(config.validate().is_err());

        config.turnover.low = 3.0;
        config.database.min_connections = 10;
        assert!(config.validate().is_err());

        config.database.min_connections = 1;
        config.allocation.base_currency = "usd".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("costing-config-{}.toml", uuid::Uuid::new_v4()));

        let mut config = EngineConfig::default();
        config.turnover.high = 12.0;
        config.database.path = Some(PathBuf::from("/tmp/ledger.db"));
        config.save(Some(path.clone())).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.turnover.high, 12.0);
        assert_eq!(loaded.database.path, Some(PathBuf::from("/tmp/ledger.db")));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&EngineConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[turnover]"));
        assert!(toml_str.contains("[allocation]"));
    }

    #[test]
    fn test_optimizer_config_mirrors_sections() {
        let mut config = EngineConfig::default();
        config.risk.cost_premium_percentage = 5.0;
        let optimizer = config.optimizer_config();
        assert_eq!(optimizer.risk.cost_premium_percentage, 5.0);
        assert_eq!(optimizer.scoring, config.scoring);
    }
}
