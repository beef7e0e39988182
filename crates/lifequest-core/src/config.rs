//! TOML-based configuration.
//!
//! Two layers:
//! - [`GameConfig`]: every reward constant, multiplier table, penalty and the
//!   level curve. Built once, validated, then shared read-only by the engine.
//! - [`AppConfig`]: the on-disk file (`<data dir>/config.toml`) wrapping the
//!   game rules plus scheduler relay and callback endpoint settings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::Difficulty;
use crate::storage::data_dir;
use crate::time::ReferenceZone;

/// One value per difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyTable<T> {
    pub easy: T,
    pub medium: T,
    pub hard: T,
}

impl<T: Copy> DifficultyTable<T> {
    pub const fn new(easy: T, medium: T, hard: T) -> Self {
        Self { easy, medium, hard }
    }

    pub fn get(&self, difficulty: Difficulty) -> T {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }
}

/// Loan task (todo) economy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoRules {
    #[serde(default = "default_todo_gold")]
    pub reward_gold: f64,
    #[serde(default = "default_todo_experience")]
    pub experience: u64,
    #[serde(default = "default_renewal_fee_fraction")]
    pub renewal_fee_fraction: f64,
    #[serde(default = "default_overdue_penalty_factor")]
    pub overdue_penalty_factor: f64,
    #[serde(default = "default_doubling_multipliers")]
    pub multipliers: DifficultyTable<f64>,
}

/// Daily quest rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRules {
    #[serde(default = "default_daily_gold")]
    pub reward_gold: f64,
    #[serde(default = "default_daily_experience")]
    pub experience: u64,
}

/// Single-streak habit toggle rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitToggleRules {
    #[serde(default = "default_habit_gold_base")]
    pub gold_base: f64,
    #[serde(default = "default_habit_experience_base")]
    pub experience_base: u64,
    #[serde(default = "default_doubling_multipliers")]
    pub multipliers: DifficultyTable<f64>,
}

/// Polarity x outcome habit trigger table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitTriggerRules {
    #[serde(default = "default_trigger_success_experience")]
    pub success_experience: u64,
    #[serde(default = "default_trigger_success_gold")]
    pub success_gold: f64,
    #[serde(default = "default_positive_failure_health")]
    pub positive_failure_health: u32,
    #[serde(default = "default_negative_failure_health")]
    pub negative_failure_health: u32,
    /// Flat experience taken on any failure outcome.
    #[serde(default = "default_failure_experience_penalty")]
    pub failure_experience_penalty: u64,
    /// When false the health penalty is only reported, never applied.
    #[serde(default)]
    pub apply_health_penalty: bool,
    #[serde(default = "default_trigger_multipliers")]
    pub multipliers: DifficultyTable<f64>,
    #[serde(default = "default_milestone_days")]
    pub milestone_days: Vec<u32>,
    #[serde(default = "default_milestone_experience_per_day")]
    pub milestone_experience_per_day: u64,
    #[serde(default = "default_milestone_gold_per_day")]
    pub milestone_gold_per_day: f64,
}

/// Game rules shared by every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Index `n` is the requirement to leave level `n + 1`.
    /// Levels past the end reuse the last entry.
    #[serde(default = "default_level_thresholds")]
    pub level_thresholds: Vec<u64>,
    #[serde(default = "default_max_health")]
    pub max_health: u32,
    /// IANA zone used for every today/yesterday comparison.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_health_penalty")]
    pub sweep_health_penalty: DifficultyTable<u32>,
    #[serde(default)]
    pub todo: TodoRules,
    #[serde(default)]
    pub daily: DailyRules,
    #[serde(default)]
    pub habit_toggle: HabitToggleRules,
    #[serde(default)]
    pub habit_trigger: HabitTriggerRules,
}

// Default functions
fn default_level_thresholds() -> Vec<u64> {
    vec![100, 300, 600, 1000, 1500, 2100, 2800, 3600, 4500, 5500]
}
fn default_max_health() -> u32 {
    100
}
fn default_timezone() -> String {
    "Asia/Kolkata".into()
}
fn default_sweep_interval_secs() -> u64 {
    3600
}
fn default_sweep_health_penalty() -> DifficultyTable<u32> {
    DifficultyTable::new(5, 10, 20)
}
fn default_doubling_multipliers() -> DifficultyTable<f64> {
    DifficultyTable::new(1.0, 2.0, 4.0)
}
fn default_trigger_multipliers() -> DifficultyTable<f64> {
    DifficultyTable::new(1.0, 1.5, 2.0)
}
fn default_todo_gold() -> f64 {
    10.0
}
fn default_todo_experience() -> u64 {
    20
}
fn default_renewal_fee_fraction() -> f64 {
    0.10
}
fn default_overdue_penalty_factor() -> f64 {
    2.0
}
fn default_daily_gold() -> f64 {
    10.0
}
fn default_daily_experience() -> u64 {
    20
}
fn default_habit_gold_base() -> f64 {
    1.0
}
fn default_habit_experience_base() -> u64 {
    5
}
fn default_trigger_success_experience() -> u64 {
    10
}
fn default_trigger_success_gold() -> f64 {
    5.0
}
fn default_positive_failure_health() -> u32 {
    10
}
fn default_negative_failure_health() -> u32 {
    20
}
fn default_failure_experience_penalty() -> u64 {
    5
}
fn default_milestone_days() -> Vec<u32> {
    vec![7, 21, 30, 66, 100, 365]
}
fn default_milestone_experience_per_day() -> u64 {
    5
}
fn default_milestone_gold_per_day() -> f64 {
    2.0
}
fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

impl Default for TodoRules {
    fn default() -> Self {
        Self {
            reward_gold: default_todo_gold(),
            experience: default_todo_experience(),
            renewal_fee_fraction: default_renewal_fee_fraction(),
            overdue_penalty_factor: default_overdue_penalty_factor(),
            multipliers: default_doubling_multipliers(),
        }
    }
}

impl Default for DailyRules {
    fn default() -> Self {
        Self {
            reward_gold: default_daily_gold(),
            experience: default_daily_experience(),
        }
    }
}

impl Default for HabitToggleRules {
    fn default() -> Self {
        Self {
            gold_base: default_habit_gold_base(),
            experience_base: default_habit_experience_base(),
            multipliers: default_doubling_multipliers(),
        }
    }
}

impl Default for HabitTriggerRules {
    fn default() -> Self {
        Self {
            success_experience: default_trigger_success_experience(),
            success_gold: default_trigger_success_gold(),
            positive_failure_health: default_positive_failure_health(),
            negative_failure_health: default_negative_failure_health(),
            failure_experience_penalty: default_failure_experience_penalty(),
            apply_health_penalty: false,
            multipliers: default_trigger_multipliers(),
            milestone_days: default_milestone_days(),
            milestone_experience_per_day: default_milestone_experience_per_day(),
            milestone_gold_per_day: default_milestone_gold_per_day(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            level_thresholds: default_level_thresholds(),
            max_health: default_max_health(),
            timezone: default_timezone(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_health_penalty: default_sweep_health_penalty(),
            todo: TodoRules::default(),
            daily: DailyRules::default(),
            habit_toggle: HabitToggleRules::default(),
            habit_trigger: HabitTriggerRules::default(),
        }
    }
}

impl GameConfig {
    /// Check the invariants the rest of the crate relies on.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level_thresholds.is_empty() {
            return Err(invalid("level_thresholds", "must contain at least one entry"));
        }
        if self.level_thresholds.iter().any(|t| *t == 0) {
            return Err(invalid("level_thresholds", "entries must be positive"));
        }
        if !(0.0..=1.0).contains(&self.todo.renewal_fee_fraction) {
            return Err(invalid("todo.renewal_fee_fraction", "must be within 0..=1"));
        }
        let factor = self.todo.overdue_penalty_factor;
        if factor < 0.0 || !factor.is_finite() {
            return Err(invalid(
                "todo.overdue_penalty_factor",
                "must be finite and non-negative",
            ));
        }
        for (key, table) in [
            ("todo.multipliers", &self.todo.multipliers),
            ("habit_toggle.multipliers", &self.habit_toggle.multipliers),
            ("habit_trigger.multipliers", &self.habit_trigger.multipliers),
        ] {
            if [table.easy, table.medium, table.hard].iter().any(|m| *m < 0.0 || !m.is_finite()) {
                return Err(invalid(key, "multipliers must be finite and non-negative"));
            }
        }
        if self.sweep_interval_secs == 0 {
            return Err(invalid("sweep_interval_secs", "must be positive"));
        }
        self.reference_zone()?;
        Ok(())
    }

    /// Parse the configured reference time zone.
    pub fn reference_zone(&self) -> Result<ReferenceZone, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| invalid("timezone", &format!("unknown IANA zone '{}'", self.timezone)))
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// QStash-style relay used to schedule deadline callbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Relay base URL, e.g. `https://qstash.upstash.io/v2`
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Public base URL the relay should call back, e.g. `https://api.example.com`
    #[serde(default)]
    pub callback_base_url: Option<String>,
}

/// Inbound deadline callback endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackSettings {
    /// Shared bearer credential, distinct from user sessions.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            token: None,
            listen_addr: default_listen_addr(),
        }
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub callback: CallbackSettings,
    /// SQLite file; defaults to `<data dir>/lifequest.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl AppConfig {
    /// Default location of the config file.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed or validated,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from an explicit path, writing defaults if the file is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let cfg = match std::fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str::<AppConfig>(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                cfg
            }
            Err(e) => {
                return Err(ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        cfg.game.validate()?;
        Ok(cfg)
    }

    /// Persist to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Secrets from the environment win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("LIFEQUEST_SCHEDULER_TOKEN") {
            self.scheduler.token = Some(token);
        }
        if let Ok(token) = std::env::var("LIFEQUEST_CALLBACK_TOKEN") {
            self.callback.token = Some(token);
        }
    }

    /// Resolved SQLite path.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("lifequest.db")),
        }
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        match json.pointer(&key_pointer(key)?)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key. The result must still validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the updated game rules are invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        let slot = key_pointer(key)
            .and_then(|pointer| json.pointer_mut(&pointer))
            .ok_or_else(|| invalid(key, "unknown config key"))?;
        let replacement = coerce_like(slot, key, value)?;
        *slot = replacement;
        let updated: AppConfig =
            serde_json::from_value(json).map_err(|e| invalid(key, &e.to_string()))?;
        updated.game.validate()?;
        *self = updated;
        Ok(())
    }
}

/// `game.daily.reward_gold` -> `/game/daily/reward_gold`
fn key_pointer(key: &str) -> Option<String> {
    if key.split('.').any(str::is_empty) {
        return None;
    }
    Some(
        key.split('.')
            .map(|part| format!("/{}", part.replace('~', "~0").replace('/', "~1")))
            .collect(),
    )
}

/// Parse `raw` into the JSON shape of the value it replaces. Unset optional
/// settings take strings.
fn coerce_like(current: &Value, key: &str, raw: &str) -> Result<Value, ConfigError> {
    let unparsable = |kind: &str| invalid(key, &format!("cannot parse '{raw}' as {kind}"));
    match current {
        Value::Bool(_) => raw.parse().map(Value::Bool).map_err(|_| unparsable("bool")),
        Value::Number(_) => raw.parse::<u64>().map(Value::from).or_else(|_| {
            raw.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| unparsable("number"))
        }),
        Value::Array(_) | Value::Object(_) => {
            serde_json::from_str(raw).map_err(|e| invalid(key, &e.to_string()))
        }
        Value::String(_) | Value::Null => Ok(Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = AppConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn defaults_match_observed_constants() {
        let game = GameConfig::default();
        assert_eq!(game.level_thresholds[0], 100);
        assert_eq!(game.level_thresholds.last(), Some(&5500));
        assert_eq!(game.todo.multipliers.get(Difficulty::Hard), 4.0);
        assert_eq!(game.habit_trigger.multipliers.get(Difficulty::Medium), 1.5);
        assert_eq!(game.sweep_health_penalty.get(Difficulty::Easy), 5);
        assert_eq!(game.habit_trigger.milestone_days, vec![7, 21, 30, 66, 100, 365]);
        assert!(!game.habit_trigger.apply_health_penalty);
        game.validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            "[game]\nlevel_thresholds = [50, 75]\n\n[game.daily]\nreward_gold = 3.0\n",
        )
        .unwrap();
        assert_eq!(parsed.game.level_thresholds, vec![50, 75]);
        assert_eq!(parsed.game.daily.reward_gold, 3.0);
        assert_eq!(parsed.game.daily.experience, 20);
        assert_eq!(parsed.callback.listen_addr, "127.0.0.1:8787");
    }

    #[test]
    fn validate_rejects_empty_thresholds() {
        let mut game = GameConfig::default();
        game.level_thresholds.clear();
        assert!(matches!(
            game.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "level_thresholds"
        ));
    }

    #[test]
    fn validate_rejects_negative_overdue_factor() {
        let mut game = GameConfig::default();
        game.todo.overdue_penalty_factor = -0.5;
        assert!(matches!(
            game.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "todo.overdue_penalty_factor"
        ));

        game.todo.overdue_penalty_factor = 0.0;
        game.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unknown_zone() {
        let mut game = GameConfig::default();
        game.timezone = "Mars/Olympus_Mons".into();
        assert!(game.validate().is_err());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.get("game.max_health").as_deref(), Some("100"));
        assert_eq!(cfg.get("game.timezone").as_deref(), Some("Asia/Kolkata"));
        assert!(cfg.get("game.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_number() {
        let mut cfg = AppConfig::default();
        cfg.set("game.daily.experience", "35").unwrap();
        assert_eq!(cfg.game.daily.experience, 35);
    }

    #[test]
    fn set_updates_nested_bool() {
        let mut cfg = AppConfig::default();
        cfg.set("game.habit_trigger.apply_health_penalty", "true").unwrap();
        assert!(cfg.game.habit_trigger.apply_health_penalty);
    }

    #[test]
    fn set_rejects_unknown_or_malformed_key() {
        let mut cfg = AppConfig::default();
        assert!(cfg.set("game.nonexistent_key", "1").is_err());
        assert!(cfg.set("", "1").is_err());
        assert!(cfg.set("game..max_health", "1").is_err());
        assert!(cfg.set("game.max_health", "lots").is_err());
        assert!(cfg.get("game.").is_none());
    }

    #[test]
    fn set_fills_unset_optional_string() {
        let mut cfg = AppConfig::default();
        cfg.set("scheduler.endpoint", "https://relay.example/v2").unwrap();
        assert_eq!(cfg.scheduler.endpoint.as_deref(), Some("https://relay.example/v2"));
    }

    #[test]
    fn set_rejects_negative_overdue_factor() {
        let mut cfg = AppConfig::default();
        assert!(cfg.set("game.todo.overdue_penalty_factor", "-2").is_err());
        assert_eq!(cfg.game.todo.overdue_penalty_factor, 2.0);
        cfg.set("game.todo.overdue_penalty_factor", "1.5").unwrap();
        assert_eq!(cfg.game.todo.overdue_penalty_factor, 1.5);
    }

    #[test]
    fn set_rejects_invalid_result() {
        let mut cfg = AppConfig::default();
        assert!(cfg.set("game.level_thresholds", "[]").is_err());
        assert_eq!(cfg.game.level_thresholds, default_level_thresholds());
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert!(path.exists());
    }
}
