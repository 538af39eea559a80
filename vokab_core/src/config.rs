//! Configuration file support for vokabulatr.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/vokabulatr/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub matching: MatcherConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn deck_path(&self) -> PathBuf {
        self.data_dir.join("deck.json")
    }

    pub fn review_log_path(&self) -> PathBuf {
        self.data_dir.join("reviews.wal")
    }

    pub fn review_archive_path(&self) -> PathBuf {
        self.data_dir.join("reviews.csv")
    }
}

/// Scheduler constants (SM-2 derived)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    #[serde(default = "default_initial_ease")]
    pub initial_ease: f64,

    #[serde(default = "default_min_ease")]
    pub min_ease: f64,

    #[serde(default = "default_max_ease")]
    pub max_ease: f64,

    #[serde(default = "default_fail_ease_penalty")]
    pub fail_ease_penalty: f64,

    #[serde(default = "default_hard_ease_penalty")]
    pub hard_ease_penalty: f64,

    #[serde(default = "default_easy_ease_bonus")]
    pub easy_ease_bonus: f64,

    #[serde(default = "default_min_relapse_interval_days")]
    pub min_relapse_interval_days: f64,

    #[serde(default = "default_first_interval_days")]
    pub first_interval_days: f64,

    #[serde(default = "default_second_interval_days")]
    pub second_interval_days: f64,

    #[serde(default = "default_max_interval_days")]
    pub max_interval_days: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_ease: default_initial_ease(),
            min_ease: default_min_ease(),
            max_ease: default_max_ease(),
            fail_ease_penalty: default_fail_ease_penalty(),
            hard_ease_penalty: default_hard_ease_penalty(),
            easy_ease_bonus: default_easy_ease_bonus(),
            min_relapse_interval_days: default_min_relapse_interval_days(),
            first_interval_days: default_first_interval_days(),
            second_interval_days: default_second_interval_days(),
            max_interval_days: default_max_interval_days(),
        }
    }
}

/// Study session policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cap on the number of cards in a `Hardest` session (unset = unbounded)
    #[serde(default)]
    pub hardest_batch_size: Option<usize>,

    /// Put failed cards back at the end of the running session
    #[serde(default)]
    pub requeue_on_fail: bool,

    /// Front ends save after every graded card, not only at session end
    #[serde(default = "default_autosave")]
    pub autosave: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hardest_batch_size: None,
            requeue_on_fail: false,
            autosave: default_autosave(),
        }
    }
}

/// Typed-answer comparison rules
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_true")]
    pub trim_whitespace: bool,

    #[serde(default = "default_true")]
    pub normalize_whitespace: bool,

    #[serde(default = "default_true")]
    pub ignore_case: bool,

    #[serde(default = "default_true")]
    pub ignore_accents: bool,

    #[serde(default = "default_true")]
    pub ignore_nonalphabetic: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            trim_whitespace: true,
            normalize_whitespace: true,
            ignore_case: true,
            ignore_accents: true,
            ignore_nonalphabetic: true,
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("vokabulatr")
}

fn default_initial_ease() -> f64 {
    2.5
}

fn default_min_ease() -> f64 {
    EASE_FLOOR
}

fn default_max_ease() -> f64 {
    5.0
}

fn default_fail_ease_penalty() -> f64 {
    0.2
}

fn default_hard_ease_penalty() -> f64 {
    0.15
}

fn default_easy_ease_bonus() -> f64 {
    0.15
}

fn default_min_relapse_interval_days() -> f64 {
    1.0
}

fn default_first_interval_days() -> f64 {
    1.0
}

fn default_second_interval_days() -> f64 {
    6.0
}

fn default_max_interval_days() -> f64 {
    36500.0
}

fn default_autosave() -> bool {
    true
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("vokabulatr").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject settings the scheduler cannot work with
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        if self.session.hardest_batch_size == Some(0) {
            return Err(Error::Config("session.hardest_batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Lowest ease factor any configuration may allow
pub const EASE_FLOOR: f64 = 1.3;

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        let eases = [
            ("initial_ease", self.initial_ease),
            ("min_ease", self.min_ease),
            ("max_ease", self.max_ease),
        ];
        for (name, value) in eases {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!(
                    "scheduler.{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.min_ease < EASE_FLOOR {
            return Err(Error::Config(format!(
                "scheduler.min_ease must be at least {}, got {}",
                EASE_FLOOR, self.min_ease
            )));
        }
        if self.min_ease > self.max_ease {
            return Err(Error::Config(format!(
                "scheduler.min_ease {} exceeds max_ease {}",
                self.min_ease, self.max_ease
            )));
        }

        let non_negative = [
            ("fail_ease_penalty", self.fail_ease_penalty),
            ("hard_ease_penalty", self.hard_ease_penalty),
            ("easy_ease_bonus", self.easy_ease_bonus),
            ("min_relapse_interval_days", self.min_relapse_interval_days),
            ("first_interval_days", self.first_interval_days),
            ("second_interval_days", self.second_interval_days),
            ("max_interval_days", self.max_interval_days),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "scheduler.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.max_interval_days < 1.0 {
            return Err(Error::Config("scheduler.max_interval_days must be at least 1".into()));
        }
        Ok(())
    }
}
