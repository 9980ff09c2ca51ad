//! Simulation configuration – read from a TOML file, every field optional.
//!
//! ```toml
//! tick_ms = 10
//! duration = 20
//! fusion_workers = 2
//!
//! [[sensors]]
//! id = "front"
//! frequency = 1
//! detections_per_tick = 3
//!
//! [[sensors]]
//! id = "rear"
//! frequency = 2
//! fail_at_tick = 15
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// One simulated sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub id: String,

    /// Detect on every tick divisible by this.
    #[serde(default = "default_frequency")]
    pub frequency: u64,

    /// Objects reported per detection.
    #[serde(default = "default_detections")]
    pub detections_per_tick: u64,

    /// Tick at which the sensor fails and crashes the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_at_tick: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Milliseconds between ticks.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Number of ticks before the clock announces termination.
    #[serde(default = "default_duration")]
    pub duration: u64,

    /// Fusion workers sharing the detection load round-robin.
    #[serde(default = "default_fusion_workers")]
    pub fusion_workers: usize,

    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorConfig>,
}

fn default_frequency() -> u64 {
    1
}
fn default_detections() -> u64 {
    1
}
fn default_tick_ms() -> u64 {
    10
}
fn default_duration() -> u64 {
    20
}
fn default_fusion_workers() -> usize {
    2
}
fn default_sensors() -> Vec<SensorConfig> {
    vec![
        SensorConfig {
            id: "front".to_string(),
            frequency: 1,
            detections_per_tick: 3,
            fail_at_tick: None,
        },
        SensorConfig {
            id: "rear".to_string(),
            frequency: 2,
            detections_per_tick: 1,
            fail_at_tick: None,
        },
    ]
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            duration: default_duration(),
            fusion_workers: default_fusion_workers(),
            sensors: default_sensors(),
        }
    }
}

impl SimConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fusion_workers == 0 {
            return Err(ConfigError::Invalid("fusion_workers must be at least 1".to_string()));
        }
        for sensor in &self.sensors {
            if sensor.id.is_empty() {
                return Err(ConfigError::Invalid("sensor id must not be empty".to_string()));
            }
            if sensor.frequency == 0 {
                return Err(ConfigError::Invalid(format!(
                    "sensor '{}' has frequency 0",
                    sensor.id
                )));
            }
        }
        let mut ids: Vec<&str> = self.sensors.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ConfigError::Invalid(format!("duplicate sensor id '{}'", pair[0])));
        }
        Ok(())
    }
}

/// Load and validate the config at `path`, then apply environment
/// overrides.
pub fn load_from(path: &Path) -> Result<SimConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: SimConfig = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Defaults plus environment overrides, used when no file is given.
pub fn from_env() -> Result<SimConfig, ConfigError> {
    let mut cfg = SimConfig::default();
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Apply `SWITCHYARD_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SWITCHYARD_TICK_MS` | `tick_ms` |
/// | `SWITCHYARD_DURATION` | `duration` |
///
/// Unparsable values are ignored.
pub fn apply_env_overrides(cfg: &mut SimConfig) {
    if let Ok(v) = std::env::var("SWITCHYARD_TICK_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.tick_ms = ms;
    }
    if let Ok(v) = std::env::var("SWITCHYARD_DURATION")
        && let Ok(ticks) = v.parse::<u64>()
    {
        cfg.duration = ticks;
    }
}
