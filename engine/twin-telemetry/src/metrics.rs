//! Metrics collection for the SimulationScheduler

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time view of scheduler metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    /// Last completed tick number
    pub current_tick: u64,

    /// Duration of the last tick in nanoseconds
    pub tick_duration_ns: u64,

    /// Number of registered subscribers
    pub subscribers: u32,

    /// Average tick duration in nanoseconds
    pub avg_tick_duration_ns: u64,

    /// Maximum tick duration in nanoseconds
    pub max_tick_duration_ns: u64,

    /// 95th percentile tick duration in nanoseconds
    pub p95_tick_duration_ns: u64,

    /// 99th percentile tick duration in nanoseconds
    pub p99_tick_duration_ns: u64,

    /// Seconds since the collector was created
    pub uptime_seconds: u64,

    /// Total ticks processed
    pub total_ticks: u64,

    /// Subscriber callbacks that ran to completion, including faulting ones
    pub total_deliveries: u64,

    /// Snapshots dropped because a subscriber queue was full
    pub dropped_deliveries: u64,

    /// Errors and panics raised by subscriber callbacks
    pub subscriber_faults: u64,

    /// Ticks whose work exceeded the tick period
    pub overruns: u64,
}

/// Lock-free metrics collector shared by the scheduler and its workers
pub struct MetricsCollector {
    current_tick: AtomicU64,
    tick_durations: Vec<AtomicU64>,
    max_tick_duration: AtomicU64,
    total_ticks: AtomicU64,

    subscribers: AtomicU64,
    total_deliveries: AtomicU64,
    dropped_deliveries: AtomicU64,
    subscriber_faults: AtomicU64,
    overruns: AtomicU64,

    start_time: Instant,
    history_size: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector keeping `history_size` tick durations
    pub fn new(history_size: usize) -> Self {
        let history_size = history_size.max(1);
        Self {
            current_tick: AtomicU64::new(0),
            tick_durations: (0..history_size).map(|_| AtomicU64::new(0)).collect(),
            max_tick_duration: AtomicU64::new(0),
            total_ticks: AtomicU64::new(0),
            subscribers: AtomicU64::new(0),
            total_deliveries: AtomicU64::new(0),
            dropped_deliveries: AtomicU64::new(0),
            subscriber_faults: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            start_time: Instant::now(),
            history_size,
        }
    }

    /// Record a completed tick
    pub fn record_tick(&self, tick: u64, duration: Duration) {
        let duration_ns = duration.as_nanos() as u64;
        let index = (tick as usize) % self.history_size;

        self.current_tick.store(tick, Ordering::Relaxed);
        self.tick_durations[index].store(duration_ns, Ordering::Relaxed);
        self.total_ticks.fetch_add(1, Ordering::Relaxed);
        self.max_tick_duration.fetch_max(duration_ns, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.total_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.subscriber_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_subscribers(&self, count: usize) {
        self.subscribers.store(count as u64, Ordering::Relaxed);
    }

    /// Get current metrics
    pub fn get_metrics(&self) -> SchedulerMetrics {
        let current_tick = self.current_tick.load(Ordering::Relaxed);
        let last_index = (current_tick as usize) % self.history_size;
        let tick_duration_ns = self.tick_durations[last_index].load(Ordering::Relaxed);

        let mut durations: Vec<u64> = self
            .tick_durations
            .iter()
            .map(|d| d.load(Ordering::Relaxed))
            .filter(|&d| d > 0)
            .collect();
        durations.sort_unstable();

        let percentile = |p: f64| -> u64 {
            if durations.is_empty() {
                return 0;
            }
            let index = (durations.len() as f64 * p) as usize;
            durations[index.min(durations.len() - 1)]
        };

        let avg_tick_duration_ns = if durations.is_empty() {
            0
        } else {
            durations.iter().sum::<u64>() / durations.len() as u64
        };

        SchedulerMetrics {
            current_tick,
            tick_duration_ns,
            subscribers: self.subscribers.load(Ordering::Relaxed) as u32,
            avg_tick_duration_ns,
            max_tick_duration_ns: self.max_tick_duration.load(Ordering::Relaxed),
            p95_tick_duration_ns: percentile(0.95),
            p99_tick_duration_ns: percentile(0.99),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            total_ticks: self.total_ticks.load(Ordering::Relaxed),
            total_deliveries: self.total_deliveries.load(Ordering::Relaxed),
            dropped_deliveries: self.dropped_deliveries.load(Ordering::Relaxed),
            subscriber_faults: self.subscriber_faults.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.current_tick.store(0, Ordering::Relaxed);
        self.max_tick_duration.store(0, Ordering::Relaxed);
        self.total_ticks.store(0, Ordering::Relaxed);
        self.total_deliveries.store(0, Ordering::Relaxed);
        self.dropped_deliveries.store(0, Ordering::Relaxed);
        self.subscriber_faults.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);

        for duration in self.tick_durations.iter() {
            duration.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("total_ticks", &self.total_ticks.load(Ordering::Relaxed))
            .field("history_size", &self.history_size)
            .finish()
    }
}
