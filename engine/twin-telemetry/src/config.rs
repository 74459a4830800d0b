//! Configuration for the telemetry engine

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assets::StateWeights;
use crate::error::ConfigError;
use crate::thresholds::ThresholdTable;
use crate::{
    DEFAULT_KPI_HISTORY_LEN, DEFAULT_METRICS_INTERVAL_MS, DEFAULT_QUEUE_DEPTH, DEFAULT_SHIFT_HOURS,
    DEFAULT_TICK_PERIOD_MS,
};

/// Configuration for the SimulationScheduler and its generators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Tick period in milliseconds (default: 1000ms = 1Hz)
    pub tick_period_ms: u64,

    /// Interval between metrics log lines in milliseconds
    pub metrics_interval_ms: u64,

    /// Seed for the random source; `None` seeds from OS entropy
    pub seed: Option<u64>,

    /// How snapshots reach subscribers
    pub delivery: DeliveryMode,

    /// Per-subscriber queue depth when delivery is dispatched
    pub queue_depth: usize,

    /// How the `trend` field of analog signals is produced
    pub trend_mode: TrendMode,

    /// Shift length used by the production-count model
    pub shift_hours: f64,

    /// Number of plant OEE values kept for the KPI trend
    pub kpi_history_len: usize,

    /// Range of ideal cycle times in seconds, drawn per asset per tick
    pub ideal_cycle_time_s: (f64, f64),

    /// Threshold table file; the built-in panel table is used when absent
    pub thresholds_path: Option<PathBuf>,

    /// Operating state weights; must sum to 1.0
    pub state_weights: StateWeights,
}

/// Delivery strategy for fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Callbacks run in registration order on the scheduler task
    Inline,
    /// Each subscriber has its own worker fed by a bounded queue
    Dispatched,
}

/// Source of the analog `trend` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMode {
    /// Independent bounded random value per tick
    Random,
    /// Analytic derivative of the waveform, in units per minute
    Derivative,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            metrics_interval_ms: DEFAULT_METRICS_INTERVAL_MS,
            seed: None,
            delivery: DeliveryMode::Dispatched,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            trend_mode: TrendMode::Random,
            shift_hours: DEFAULT_SHIFT_HOURS,
            kpi_history_len: DEFAULT_KPI_HISTORY_LEN,
            ideal_cycle_time_s: (120.0, 360.0),
            thresholds_path: None,
            state_weights: StateWeights::default(),
        }
    }
}

impl SimulatorConfig {
    /// Get tick period as Duration
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Get metrics interval as Duration
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    /// Check every field; any error is fatal to startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tick_period_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue_depth",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(self.shift_hours.is_finite() && self.shift_hours > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "shift_hours",
                reason: format!("{} is not a positive number of hours", self.shift_hours),
            });
        }
        if self.kpi_history_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "kpi_history_len",
                reason: "must keep at least the current value".to_string(),
            });
        }
        self.state_weights.validate()?;

        let (min, max) = self.ideal_cycle_time_s;
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= max) {
            return Err(ConfigError::InvalidCycleTimeRange { min, max });
        }
        Ok(())
    }

    /// Threshold table named by `thresholds_path`, or the built-in panel table
    pub fn load_thresholds(&self) -> Result<ThresholdTable, ConfigError> {
        match &self.thresholds_path {
            Some(path) => ThresholdTable::from_file(path),
            None => Ok(ThresholdTable::panel_default()),
        }
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: display.clone(), source })?;
        let config: SimulatorConfig = toml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: display, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Ok(())
    }
}
