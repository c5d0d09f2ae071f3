//! Configuration management with validation and defaults
//!
//! Every tunable of the engine (bet limits, payout multipliers, anti-flood
//! windows, daily quota, storage) lives here. `ConfigLoader` reads TOML and
//! applies `ROULETTE_*` environment overrides before validating.

use crate::errors::{ConfigurationError, EngineResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Complete engine configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bets: BetLimits,
    pub payouts: PayoutTable,
    pub wheel: WheelConfig,
    pub anti_flood: AntiFloodConfig,
    pub spin_limit: SpinLimitConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

/// Per-bet and per-session stake limits
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BetLimits {
    pub min_bet: i64,
    /// Ceiling for a single bet
    pub max_bet: i64,
    /// Ceiling for all pending bets of one user in one room
    pub max_total_per_user: i64,
}

impl Default for BetLimits {
    fn default() -> Self {
        Self {
            min_bet: 10,
            max_bet: 100_000_000,
            max_total_per_user: 500_000_000,
        }
    }
}

/// Profit multipliers. Profit excludes the returned stake.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutTable {
    pub number_multiplier: i64,
    pub red_black_multiplier: i64,
    pub green_multiplier: i64,
    /// Numerator of the width-based range multiplier (`base / width`)
    pub range_base: i64,
    /// Fixed multiplier for 1-3, 4-6, 7-9 and 10-12, in thousandths
    pub quarter_multiplier_milli: i64,
}

impl Default for PayoutTable {
    fn default() -> Self {
        Self {
            number_multiplier: 12,
            red_black_multiplier: 2,
            green_multiplier: 12,
            range_base: 12,
            quarter_multiplier_milli: 4_333,
        }
    }
}

/// Outcome generator settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Longest allowed run of one color
    pub max_color_streak: usize,
    pub history_len: usize,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            max_color_streak: 3,
            history_len: 10,
        }
    }
}

/// In-memory spin trigger throttling per (user, room)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiFloodConfig {
    pub min_interval_ms: u64,
    pub max_spins_per_minute: u32,
    /// Entries untouched for this long are evicted
    pub eviction_horizon_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for AntiFloodConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 3_000,
            max_spins_per_minute: 10,
            eviction_horizon_seconds: 600,
            cleanup_interval_seconds: 300,
        }
    }
}

impl AntiFloodConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn eviction_horizon(&self) -> Duration {
        Duration::from_secs(self.eviction_horizon_seconds)
    }

    /// Never shorter than one second
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds.max(1))
    }
}

/// Daily spin quota per (user, room)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinLimitConfig {
    /// 0 disables the quota
    pub daily_limit: u32,
    pub retention_days: u32,
    pub purge_interval_seconds: u64,
}

impl Default for SpinLimitConfig {
    fn default() -> Self {
        Self {
            daily_limit: 50,
            retention_days: 7,
            purge_interval_seconds: 3_600,
        }
    }
}

impl SpinLimitConfig {
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds.max(1))
    }
}

/// Room session lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle rooms without pending bets are dropped after this long
    pub idle_timeout_seconds: u64,
    pub gc_interval_seconds: u64,
    /// How many outcomes `recent_outcomes` may return
    pub history_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 3_600,
            gc_interval_seconds: 300,
            history_window: 50,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_seconds.max(1))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./roulette_data".to_string(),
            clear_on_start: false,
        }
    }
}

impl EngineConfig {
    /// Relaxed limits for tests and local simulation
    pub fn testing() -> Self {
        Self {
            bets: BetLimits {
                min_bet: 1,
                ..BetLimits::default()
            },
            anti_flood: AntiFloodConfig {
                min_interval_ms: 0,
                max_spins_per_minute: 0,
                ..AntiFloodConfig::default()
            },
            spin_limit: SpinLimitConfig {
                daily_limit: 0,
                ..SpinLimitConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let bets = &self.bets;
        if bets.min_bet <= 0 {
            return Err(invalid("bets.min_bet", bets.min_bet, "Minimum bet must be positive"));
        }
        if bets.max_bet < bets.min_bet {
            return Err(invalid("bets.max_bet", bets.max_bet, "Maximum bet is below the minimum bet"));
        }
        if bets.max_total_per_user < bets.min_bet {
            return Err(invalid(
                "bets.max_total_per_user",
                bets.max_total_per_user,
                "Session cap is below the minimum bet",
            ));
        }

        let payouts = &self.payouts;
        for (field, value) in [
            ("payouts.number_multiplier", payouts.number_multiplier),
            ("payouts.red_black_multiplier", payouts.red_black_multiplier),
            ("payouts.green_multiplier", payouts.green_multiplier),
            ("payouts.range_base", payouts.range_base),
            ("payouts.quarter_multiplier_milli", payouts.quarter_multiplier_milli),
        ] {
            if value <= 0 {
                return Err(invalid(field, value, "Multiplier must be positive"));
            }
        }

        if self.wheel.max_color_streak == 0 {
            return Err(invalid("wheel.max_color_streak", 0, "Streak cap must be at least 1"));
        }
        if self.wheel.history_len < self.wheel.max_color_streak {
            return Err(invalid(
                "wheel.history_len",
                self.wheel.history_len,
                "History must hold at least one full streak",
            ));
        }

        if self.session.history_window == 0 {
            return Err(invalid("session.history_window", 0, "History window cannot be zero"));
        }

        if self.storage.data_dir.is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.data_dir".to_string()));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> EngineResult<EngineConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => EngineConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<EngineConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut EngineConfig) -> Result<(), ConfigurationError> {
        if let Some(v) = env_parse("ROULETTE_MIN_BET")? {
            config.bets.min_bet = v;
        }
        if let Some(v) = env_parse("ROULETTE_MAX_BET")? {
            config.bets.max_bet = v;
        }
        if let Some(v) = env_parse("ROULETTE_MAX_TOTAL_PER_USER")? {
            config.bets.max_total_per_user = v;
        }
        if let Some(v) = env_parse("ROULETTE_DAILY_SPIN_LIMIT")? {
            config.spin_limit.daily_limit = v;
        }
        if let Some(v) = env_parse("ROULETTE_MIN_SPIN_INTERVAL_MS")? {
            config.anti_flood.min_interval_ms = v;
        }
        if let Ok(data_dir) = env::var("ROULETTE_DATA_DIR") {
            config.storage.data_dir = data_dir;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &EngineConfig, path: &str) -> EngineResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigurationError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigurationError::InvalidValue {
            field: key.to_string(),
            value: raw,
            reason: "Not a valid number".to_string(),
        }),
        Err(_) => Ok(None),
    }
}

/// Builder pattern for creating configurations
#[derive(Default)]
pub struct ConfigBuilder {
    config: EngineConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn bets(mut self, bets: BetLimits) -> Self {
        self.config.bets = bets;
        self
    }

    pub fn payouts(mut self, payouts: PayoutTable) -> Self {
        self.config.payouts = payouts;
        self
    }

    pub fn anti_flood(mut self, anti_flood: AntiFloodConfig) -> Self {
        self.config.anti_flood = anti_flood;
        self
    }

    pub fn spin_limit(mut self, spin_limit: SpinLimitConfig) -> Self {
        self.config.spin_limit = spin_limit;
        self
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> EngineResult<()> {
    ConfigLoader::new().save(&EngineConfig::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payouts.number_multiplier, 12);
        assert_eq!(config.wheel.max_color_streak, 3);
    }

    #[test]
    fn test_testing_config_is_valid() {
        let config = EngineConfig::testing();
        assert!(config.validate().is_ok());
        assert_eq!(config.spin_limit.daily_limit, 0);
    }

    #[test]
    fn test_section_durations() {
        let config = EngineConfig::default();
        assert_eq!(config.anti_flood.min_interval(), Duration::from_secs(3));
        assert_eq!(config.anti_flood.eviction_horizon(), Duration::from_secs(600));
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(3_600));

        let mut session = SessionConfig::default();
        session.gc_interval_seconds = 0;
        assert_eq!(session.gc_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = EngineConfig::default();
        config.bets.max_bet = config.bets.min_bet - 1;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.payouts.quarter_multiplier_milli = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.wheel.history_len = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .bets(BetLimits {
                min_bet: 100,
                max_bet: 1_000,
                max_total_per_user: 5_000,
            })
            .build();

        assert_eq!(config.bets.min_bet, 100);
        assert_eq!(config.bets.max_total_per_user, 5_000);
        assert_eq!(config.anti_flood.max_spins_per_minute, 10);
    }

    #[test]
    fn test_save_and_load_config() -> EngineResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut original = EngineConfig::default();
        original.bets.min_bet = 25;
        ConfigLoader::new().save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;
        assert_eq!(loaded.bets.min_bet, 25);
        assert_eq!(loaded.payouts.quarter_multiplier_milli, 4_333);

        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[bets]\nmin_bet = 50\n").unwrap();

        let loaded = ConfigLoader::new().with_path(temp_file.path()).load().unwrap();
        assert_eq!(loaded.bets.min_bet, 50);
        assert_eq!(loaded.bets.max_bet, BetLimits::default().max_bet);
        assert_eq!(loaded.session.history_window, 50);
    }
}
