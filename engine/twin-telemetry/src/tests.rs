//! Unit tests for configuration, errors and metrics

use std::time::Duration;

use crate::assets::StateWeights;
use crate::{
    ConfigError, DeliveryMode, MetricsCollector, SimulatorConfig, SimulatorError, SubscriberError,
    TrendMode, DEFAULT_KPI_HISTORY_LEN, DEFAULT_METRICS_INTERVAL_MS, DEFAULT_QUEUE_DEPTH,
    DEFAULT_TICK_PERIOD_MS,
};

fn create_test_config() -> SimulatorConfig {
    SimulatorConfig {
        tick_period_ms: 10, // 10ms for faster testing
        metrics_interval_ms: 100,
        seed: Some(7),
        delivery: DeliveryMode::Inline,
        queue_depth: 2,
        trend_mode: TrendMode::Derivative,
        kpi_history_len: 6,
        ..Default::default()
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_simulator_config_default() {
        let config = SimulatorConfig::default();
        assert_eq!(config.tick_period_ms, DEFAULT_TICK_PERIOD_MS);
        assert_eq!(config.metrics_interval_ms, DEFAULT_METRICS_INTERVAL_MS);
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.kpi_history_len, DEFAULT_KPI_HISTORY_LEN);
        assert_eq!(config.delivery, DeliveryMode::Dispatched);
        assert_eq!(config.trend_mode, TrendMode::Random);
        assert!(config.seed.is_none());
        assert!(config.thresholds_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_conversion() {
        let config = SimulatorConfig::default();
        assert_eq!(config.tick_period(), Duration::from_secs(1));
        assert_eq!(config.metrics_interval(), Duration::from_secs(10));

        let config = create_test_config();
        assert_eq!(config.tick_period(), Duration::from_millis(10));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_period = SimulatorConfig { tick_period_ms: 0, ..Default::default() };
        assert!(matches!(
            zero_period.validate(),
            Err(ConfigError::InvalidValue { field: "tick_period_ms", .. })
        ));

        let zero_queue = SimulatorConfig { queue_depth: 0, ..Default::default() };
        assert!(matches!(
            zero_queue.validate(),
            Err(ConfigError::InvalidValue { field: "queue_depth", .. })
        ));

        let bad_shift = SimulatorConfig { shift_hours: -1.0, ..Default::default() };
        assert!(matches!(
            bad_shift.validate(),
            Err(ConfigError::InvalidValue { field: "shift_hours", .. })
        ));

        let no_history = SimulatorConfig { kpi_history_len: 0, ..Default::default() };
        assert!(no_history.validate().is_err());

        let reversed = SimulatorConfig { ideal_cycle_time_s: (360.0, 120.0), ..Default::default() };
        assert!(matches!(reversed.validate(), Err(ConfigError::InvalidCycleTimeRange { .. })));

        let weights = StateWeights { running: 0.9, ..Default::default() };
        let skewed = SimulatorConfig { state_weights: weights, ..Default::default() };
        assert!(matches!(skewed.validate(), Err(ConfigError::InvalidStateWeights { .. })));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SimulatorConfig = toml::from_str(
            r#"
            tick_period_ms = 250
            delivery = "inline"
            trend_mode = "derivative"
            "#,
        )
        .unwrap();

        assert_eq!(config.tick_period_ms, 250);
        assert_eq!(config.delivery, DeliveryMode::Inline);
        assert_eq!(config.trend_mode, TrendMode::Derivative);
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.state_weights, StateWeights::default());
    }

    #[test]
    fn test_config_file_operations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twin.toml");

        let config = create_test_config();
        config.to_file(&path).unwrap();
        let loaded = SimulatorConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "tick_period_ms = 0\n").unwrap();
        assert!(matches!(
            SimulatorConfig::from_file(&path),
            Err(ConfigError::InvalidValue { field: "tick_period_ms", .. })
        ));

        std::fs::write(&path, "tick_period_ms = \"fast\"\n").unwrap();
        assert!(matches!(SimulatorConfig::from_file(&path), Err(ConfigError::Parse { .. })));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(SimulatorConfig::from_file(missing), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_thresholds_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.toml");
        std::fs::write(
            &path,
            r#"
            [tags."line.press.force_kn"]
            warn = 80.0
            alarm = 95.0
            direction = "above"
            "#,
        )
        .unwrap();

        let config = SimulatorConfig { thresholds_path: Some(path), ..Default::default() };
        let table = config.load_thresholds().unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get("line.press.force_kn").is_some());

        let builtin = SimulatorConfig::default().load_thresholds().unwrap();
        assert_eq!(builtin.len(), 13);
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingBand { tag: "panel.ambient.rh_pct".to_string() };
        assert_eq!(error.to_string(), "Policy for panel.ambient.rh_pct uses outside_band but has no band");

        let error = ConfigError::InvalidValue {
            field: "queue_depth",
            reason: "must be greater than zero".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid queue_depth: must be greater than zero");
    }

    #[test]
    fn test_subscriber_error_display() {
        let error = SubscriberError::Failed { id: 3, tick: 12, message: "socket closed".to_string() };
        assert_eq!(error.to_string(), "Subscriber 3 returned an error on tick 12: socket closed");

        let error = SubscriberError::Panicked { id: 4, tick: 1, message: "boom".to_string() };
        assert_eq!(error.to_string(), "Subscriber 4 panicked on tick 1: boom");
    }

    #[test]
    fn test_error_conversion() {
        let error: SimulatorError = ConfigError::InvalidStateWeights { sum: 0.9 }.into();
        assert!(matches!(error, SimulatorError::Config(_)));
        assert!(error.to_string().starts_with("Configuration error:"));

        let error: SimulatorError =
            SubscriberError::Failed { id: 1, tick: 1, message: String::new() }.into();
        assert!(matches!(error, SimulatorError::Subscriber(_)));
    }
}

#[cfg(test)]
mod metrics_tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new(100);
        let metrics = collector.get_metrics();

        assert_eq!(metrics.current_tick, 0);
        assert_eq!(metrics.total_ticks, 0);
        assert_eq!(metrics.avg_tick_duration_ns, 0);
        assert_eq!(metrics.p99_tick_duration_ns, 0);
        assert_eq!(metrics.total_deliveries, 0);
    }

    #[test]
    fn test_metrics_recording() {
        let collector = MetricsCollector::new(100);

        for tick in 1..=10 {
            collector.record_tick(tick, Duration::from_micros(tick * 100));
        }
        collector.record_delivery();
        collector.record_delivery();
        collector.record_dropped();
        collector.record_fault();
        collector.record_overrun();
        collector.update_subscribers(3);

        let metrics = collector.get_metrics();
        assert_eq!(metrics.current_tick, 10);
        assert_eq!(metrics.total_ticks, 10);
        assert_eq!(metrics.tick_duration_ns, 1_000_000);
        assert_eq!(metrics.max_tick_duration_ns, 1_000_000);
        assert_eq!(metrics.avg_tick_duration_ns, 550_000);
        assert_eq!(metrics.p99_tick_duration_ns, 1_000_000);
        assert_eq!(metrics.subscribers, 3);
        assert_eq!(metrics.total_deliveries, 2);
        assert_eq!(metrics.dropped_deliveries, 1);
        assert_eq!(metrics.subscriber_faults, 1);
        assert_eq!(metrics.overruns, 1);
    }

    #[test]
    fn test_metrics_history_wraps() {
        let collector = MetricsCollector::new(4);
        for tick in 1..=8 {
            collector.record_tick(tick, Duration::from_nanos(tick * 10));
        }

        let metrics = collector.get_metrics();
        // Only ticks 5..=8 remain in the window
        assert_eq!(metrics.avg_tick_duration_ns, 65);
        assert_eq!(metrics.max_tick_duration_ns, 80);
        assert_eq!(metrics.total_ticks, 8);
    }

    #[test]
    fn test_metrics_reset() {
        let collector = MetricsCollector::default();
        collector.record_tick(1, Duration::from_millis(1));
        collector.record_delivery();
        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.total_ticks, 0);
        assert_eq!(metrics.total_deliveries, 0);
        assert_eq!(metrics.max_tick_duration_ns, 0);
    }
}
