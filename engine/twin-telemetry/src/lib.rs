//! # TwinTelemetry
//!
//! Synthetic telemetry core of the panel-shop digital twin.
//!
//! A [`SimulationScheduler`] ticks on a fixed period. Every tick it resamples all
//! panel signals and plant assets, classifies each signal against its
//! [`ThresholdPolicy`], and fans the resulting immutable [`Snapshot`] out to every
//! subscriber registered in its [`SubscriptionRegistry`]. Renderers only ever see
//! `Arc<Snapshot>` values and cannot influence generation.

pub mod assets;
pub mod classifier;
pub mod config;
pub mod error;
pub mod metrics;
pub mod plant;
pub mod registry;
pub mod scheduler;
pub mod signals;
pub mod snapshot;
pub mod thresholds;

#[cfg(test)]
mod tests;


pub use assets::{Asset, AssetDef, AssetStateSampler, MachineState, StateWeights};
pub use classifier::{classify, AlertLevel};
pub use config::{DeliveryMode, SimulatorConfig, TrendMode};
pub use error::{ConfigError, SimulatorError, SubscriberError};
pub use metrics::{MetricsCollector, SchedulerMetrics};
pub use plant::{EnergyPoint, KpiSummary, QualityStation};
pub use registry::{SubscriberId, SubscriptionHandle, SubscriptionRegistry};
pub use scheduler::SimulationScheduler;
pub use signals::{Signal, SignalGenerator, SignalProfile, SignalValue};
pub use snapshot::{AlertSummary, Snapshot, SnapshotBuilder};
pub use thresholds::{Band, ThresholdPolicy, ThresholdTable};

/// Current version of the telemetry engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tick period (1 Hz)
pub const DEFAULT_TICK_PERIOD_MS: u64 = 1000;

/// Default metrics emission interval
pub const DEFAULT_METRICS_INTERVAL_MS: u64 = 10_000;

/// Default per-subscriber queue depth in dispatched delivery mode
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

/// Default number of plant OEE samples retained for the KPI trend
pub const DEFAULT_KPI_HISTORY_LEN: usize = 24;

/// Default shift length used by the production-count model
pub const DEFAULT_SHIFT_HOURS: f64 = 8.0;
