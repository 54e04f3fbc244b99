//! Configuration file support for setrep.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/setrep/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub plateau: PlateauPolicy,

    #[serde(default)]
    pub timer: TimerConfig,

    #[serde(default)]
    pub session: SessionConfig,
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

/// Thresholds and increments used by the plateau detection engine
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlateauPolicy {
    /// Stagnant prior sessions needed before a plateau is reported
    #[serde(default = "default_min_sessions_for_plateau")]
    pub min_sessions_for_plateau: usize,

    /// Load added by the increase-weight suggestion
    #[serde(default = "default_weight_increment")]
    pub weight_increment: f64,

    /// Reps added by the increase-reps suggestion
    #[serde(default = "default_rep_increment")]
    pub rep_increment: u32,

    #[serde(default = "default_moderate_after_sessions")]
    pub moderate_after_sessions: usize,

    #[serde(default = "default_severe_after_sessions")]
    pub severe_after_sessions: usize,

    /// Historic series further apart than this belong to different sessions
    #[serde(default = "default_session_gap_hours")]
    pub session_gap_hours: i64,

    /// Rep count from which adding load is preferred over adding reps
    #[serde(default = "default_rep_ceiling")]
    pub rep_ceiling: u32,
}

impl Default for PlateauPolicy {
    fn default() -> Self {
        Self {
            min_sessions_for_plateau: default_min_sessions_for_plateau(),
            weight_increment: default_weight_increment(),
            rep_increment: default_rep_increment(),
            moderate_after_sessions: default_moderate_after_sessions(),
            severe_after_sessions: default_severe_after_sessions(),
            session_gap_hours: default_session_gap_hours(),
            rep_ceiling: default_rep_ceiling(),
        }
    }
}

/// Recovery timer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Remaining seconds at or below which a countdown beep plays
    #[serde(default = "default_countdown_cue_seconds")]
    pub countdown_cue_seconds: u32,

    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            countdown_cue_seconds: default_countdown_cue_seconds(),
            tick_millis: default_tick_millis(),
        }
    }
}

impl TimerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}

/// Session state machine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Delay before a plateau scan runs after a trigger
    #[serde(default = "default_scan_settle_millis")]
    pub scan_settle_millis: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_settle_millis: default_scan_settle_millis(),
        }
    }
}

impl SessionConfig {
    pub fn scan_settle(&self) -> Duration {
        Duration::from_millis(self.scan_settle_millis)
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| home_dir().join(".local/share"));
    base.join("setrep")
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_min_sessions_for_plateau() -> usize {
    2
}

fn default_weight_increment() -> f64 {
    2.5
}

fn default_rep_increment() -> u32 {
    2
}

fn default_moderate_after_sessions() -> usize {
    4
}

fn default_severe_after_sessions() -> usize {
    6
}

fn default_session_gap_hours() -> i64 {
    4
}

fn default_rep_ceiling() -> u32 {
    12
}

fn default_countdown_cue_seconds() -> u32 {
    3
}

fn default_tick_millis() -> u64 {
    1000
}

fn default_scan_settle_millis() -> u64 {
    100
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
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
        let base = dirs::config_dir().unwrap_or_else(|| home_dir().join(".config"));
        base.join("setrep").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write to a sibling temp file, then atomically replace
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(contents.as_bytes())?;
        temp.flush()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject policies the plateau engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let p = &self.plateau;
        if p.min_sessions_for_plateau == 0 {
            return Err(Error::Config(
                "plateau.min_sessions_for_plateau must be at least 1".into(),
            ));
        }
        if p.severe_after_sessions < p.moderate_after_sessions {
            return Err(Error::Config(format!(
                "plateau.severe_after_sessions ({}) is below moderate_after_sessions ({})",
                p.severe_after_sessions, p.moderate_after_sessions
            )));
        }
        if !(p.weight_increment > 0.0) || p.rep_increment == 0 {
            return Err(Error::Config(
                "plateau increments must be positive".into(),
            ));
        }
        Ok(())
    }
}
