use crate::controller::SpeedLimits;
use crate::coordinator::CoordinatorSettings;
use crate::validate_enum;
use anyhow::{Context, Result};
use common::ParameterChange;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub handover: HandoverSettings,

    #[serde(default)]
    pub playback: PlaybackSettings,

    #[serde(default)]
    pub startup: StartupSettings,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Poll cycles per second
    #[serde(default = "default_cycle_rate")]
    pub cycle_rate: u32,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            cycle_rate: default_cycle_rate(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_cycle_rate() -> u32 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandoverSettings {
    /// Percent of read-ahead buffer the spare needs before the swap
    #[serde(default = "default_ready_buffer_level")]
    pub ready_buffer_level: f32,

    #[serde(default = "default_frame_queue_depth")]
    pub frame_queue_depth: usize,

    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for HandoverSettings {
    fn default() -> Self {
        Self {
            ready_buffer_level: default_ready_buffer_level(),
            frame_queue_depth: default_frame_queue_depth(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

fn default_ready_buffer_level() -> f32 {
    90.0
}
fn default_frame_queue_depth() -> usize {
    4
}
fn default_stats_interval() -> u64 {
    5
}

/// Backend playback rate bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackSettings {
    #[serde(default = "default_min_speed")]
    pub min_speed: f32,

    #[serde(default = "default_max_speed")]
    pub max_speed: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            min_speed: default_min_speed(),
            max_speed: default_max_speed(),
        }
    }
}

fn default_min_speed() -> f32 {
    0.25
}
fn default_max_speed() -> f32 {
    4.0
}

/// Input values applied once at startup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartupSettings {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub looping: bool,

    #[serde(default)]
    pub paused: bool,

    #[serde(default)]
    pub switch_on_cue: bool,

    #[serde(default = "default_playback_speed")]
    pub playback_speed: f32,
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            looping: false,
            paused: false,
            switch_on_cue: false,
            playback_speed: default_playback_speed(),
        }
    }
}

fn default_playback_speed() -> f32 {
    1.0
}

impl StartupSettings {
    /// The startup values as input changes, in application order
    pub fn changes(&self) -> Vec<ParameterChange> {
        vec![
            ParameterChange::Looping(self.looping),
            ParameterChange::Paused(self.paused),
            ParameterChange::SwitchOnCue(self.switch_on_cue),
            ParameterChange::Speed(self.playback_speed),
            ParameterChange::Url(self.url.clone()),
        ]
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("handover");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.validate_log_level(&self.general.log_level)?;

        if !(1..=240).contains(&self.general.cycle_rate) {
            anyhow::bail!(
                "Invalid cycle rate: {} (must be 1-240)",
                self.general.cycle_rate
            );
        }

        let level = self.handover.ready_buffer_level;
        if !(0.0..=100.0).contains(&level) {
            anyhow::bail!("Invalid ready buffer level: {} (must be 0-100)", level);
        }

        if self.handover.frame_queue_depth == 0 {
            anyhow::bail!("Frame queue depth must be at least 1");
        }

        let speed = &self.playback;
        if !(speed.min_speed > 0.0 && speed.min_speed <= speed.max_speed) {
            anyhow::bail!(
                "Invalid speed range: {} - {}",
                speed.min_speed,
                speed.max_speed
            );
        }

        Ok(())
    }

    fn validate_log_level(&self, level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.general.cycle_rate.max(1)))
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            ready_buffer_level: self.handover.ready_buffer_level,
            frame_queue_depth: self.handover.frame_queue_depth,
            stats_interval: Duration::from_secs(self.handover.stats_interval_secs),
        }
    }

    pub fn speed_limits(&self) -> SpeedLimits {
        SpeedLimits {
            min: self.playback.min_speed,
            max: self.playback.max_speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.cycle_rate, 60);
        assert_eq!(config.handover.ready_buffer_level, 90.0);
        assert_eq!(config.handover.frame_queue_depth, 4);
        assert_eq!(config.startup.playback_speed, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let config = Config::default();
        assert!(config.validate_log_level("debug").is_ok());
        assert!(config.validate_log_level("verbose").is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let toml = r#"
[handover]
ready_buffer_level = 75.0

[startup]
url = "https://example.com/live.m3u8"
looping = true
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.handover.ready_buffer_level, 75.0);
        assert_eq!(config.handover.frame_queue_depth, 4);
        assert_eq!(config.general.cycle_rate, 60);
        assert_eq!(config.startup.url, "https://example.com/live.m3u8");
        assert!(config.startup.looping);
        assert!(!config.startup.paused);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.general.cycle_rate = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.handover.ready_buffer_level = 120.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.handover.frame_queue_depth = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.playback.min_speed = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[general]\nlog_level = \"debug\"\ncycle_rate = 30").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.cycle_period(), Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[general]\nlog_level = \"loud\"").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not toml at all [").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.general.cycle_rate, 60);
    }

    #[test]
    fn test_startup_changes_end_with_url() {
        let startup = StartupSettings {
            url: "a.mp4".to_string(),
            ..Default::default()
        };
        let changes = startup.changes();
        assert_eq!(changes.last(), Some(&ParameterChange::Url("a.mp4".to_string())));
        assert!(changes.contains(&ParameterChange::Speed(1.0)));
    }
}
