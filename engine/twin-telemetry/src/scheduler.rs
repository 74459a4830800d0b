//! Core SimulationScheduler implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::classifier::AlertLevel;
use crate::config::{DeliveryMode, SimulatorConfig};
use crate::error::{SimulatorError, SubscriberError};
use crate::metrics::{MetricsCollector, SchedulerMetrics};
use crate::registry::{Subscriber, SubscriberId, SubscriptionHandle, SubscriptionRegistry};
use crate::signals::SignalValue;
use crate::snapshot::{Snapshot, SnapshotBuilder};
use crate::thresholds::ThresholdTable;

/// Cancellation shared by the tick loop and its delivery workers
#[derive(Debug)]
struct Shutdown {
    accepting: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    fn new() -> Arc<Self> {
        Arc::new(Self { accepting: AtomicBool::new(true), notify: Notify::new() })
    }

    fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.accepting.store(false, Ordering::Release);
        // Stores a permit if the loop is mid-tick rather than waiting
        self.notify.notify_one();
    }
}

struct ActiveLoop {
    shutdown: Arc<Shutdown>,
    handle: JoinHandle<SnapshotBuilder>,
}

#[derive(Default)]
struct Lifecycle {
    builder: Option<SnapshotBuilder>,
    active: Option<ActiveLoop>,
}

/// The simulation heartbeat: builds one snapshot per tick and fans it out
pub struct SimulationScheduler {
    config: SimulatorConfig,
    thresholds: Arc<ThresholdTable>,
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<MetricsCollector>,
    latest: Arc<RwLock<Option<Arc<Snapshot>>>>,
    running: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

impl SimulationScheduler {
    /// Create a scheduler, loading thresholds as the configuration says
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;
        let thresholds = config.load_thresholds()?;
        Self::with_thresholds(config, thresholds)
    }

    /// Create a scheduler with an explicit threshold table
    pub fn with_thresholds(
        config: SimulatorConfig,
        thresholds: ThresholdTable,
    ) -> Result<Self, SimulatorError> {
        let thresholds = Arc::new(thresholds);
        let builder = SnapshotBuilder::from_config(&config, thresholds.clone())?;

        tracing::info!(
            "Creating SimulationScheduler: period {:?}, {:?} delivery, {} threshold policies",
            config.tick_period(),
            config.delivery,
            thresholds.len()
        );

        Ok(Self {
            config,
            thresholds,
            registry: SubscriptionRegistry::new(),
            metrics: Arc::new(MetricsCollector::new(1000)),
            latest: Arc::new(RwLock::new(None)),
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle { builder: Some(builder), active: None }),
        })
    }

    /// Begin ticking. A no-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&self) -> Result<(), SimulatorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.active.is_some() {
            tracing::debug!("SimulationScheduler already running, ignoring start");
            return Ok(());
        }

        let builder = match lifecycle.builder.take() {
            Some(builder) => builder,
            None => SnapshotBuilder::from_config(&self.config, self.thresholds.clone())?,
        };

        let shutdown = Shutdown::new();
        let ctx = LoopContext {
            period: self.config.tick_period(),
            metrics_interval: self.config.metrics_interval(),
            fanout: Fanout::new(
                self.config.delivery,
                self.config.queue_depth,
                self.metrics.clone(),
                shutdown.clone(),
            ),
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            latest: self.latest.clone(),
            shutdown: shutdown.clone(),
        };

        let handle = tokio::spawn(run_tick_loop(builder, ctx));
        lifecycle.active = Some(ActiveLoop { shutdown, handle });
        self.running.store(true, Ordering::Release);

        tracing::info!("SimulationScheduler started");
        Ok(())
    }

    /// Stop ticking and wait for in-flight deliveries to finish.
    ///
    /// Once this returns no subscriber callback runs again until the next
    /// `start`. A no-op if already stopped.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(active) = lifecycle.active.take() else {
            return;
        };

        active.shutdown.close();
        self.running.store(false, Ordering::Release);

        match active.handle.await {
            Ok(builder) => lifecycle.builder = Some(builder),
            Err(e) => {
                tracing::error!("Scheduler task ended abnormally: {}", e);
                // Rebuilt lazily by the next start
                lifecycle.builder = None;
            }
        }

        tracing::info!("SimulationScheduler stopped");
    }

    /// Check if the scheduler is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Register a snapshot callback
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Arc<Snapshot>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handle = self.registry.subscribe(callback);
        self.metrics.update_subscribers(self.registry.len());
        handle
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.registry.unsubscribe(id);
        self.metrics.update_subscribers(self.registry.len());
        removed
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Most recent snapshot, if any tick has run
    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.latest.read().clone()
    }

    /// Ad-hoc classification against the loaded threshold table
    pub fn classify(&self, tag: &str, value: Option<SignalValue>) -> AlertLevel {
        self.thresholds.classify(tag, value)
    }

    pub fn thresholds(&self) -> &Arc<ThresholdTable> {
        &self.thresholds
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Get current metrics
    pub fn get_metrics(&self) -> SchedulerMetrics {
        self.metrics.get_metrics()
    }
}

impl Drop for SimulationScheduler {
    fn drop(&mut self) {
        // Without an await point the loop can only be told to wind down
        if let Some(active) = &self.lifecycle.get_mut().active {
            active.shutdown.close();
        }
    }
}

struct LoopContext {
    period: Duration,
    metrics_interval: Duration,
    fanout: Fanout,
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<MetricsCollector>,
    latest: Arc<RwLock<Option<Arc<Snapshot>>>>,
    shutdown: Arc<Shutdown>,
}

/// Tick loop. Returns the builder so a later start continues the same stream.
async fn run_tick_loop(mut builder: SnapshotBuilder, mut ctx: LoopContext) -> SnapshotBuilder {
    let mut interval = tokio::time::interval_at(Instant::now() + ctx.period, ctx.period);
    // A late tick is deferred, never doubled up
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_metrics_emission = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.notify.notified() => break,
            _ = interval.tick() => {}
        }
        if !ctx.shutdown.is_accepting() {
            break;
        }

        let tick_start = Instant::now();
        let snapshot = Arc::new(builder.build(Utc::now()));
        let tick = snapshot.tick;
        *ctx.latest.write() = Some(snapshot.clone());

        let members = ctx.registry.members();
        ctx.metrics.update_subscribers(members.len());
        ctx.fanout.deliver(&members, snapshot);

        let elapsed = tick_start.elapsed();
        ctx.metrics.record_tick(tick, elapsed);
        if elapsed > ctx.period {
            ctx.metrics.record_overrun();
            tracing::warn!("Tick {} took {:?}, period is {:?}", tick, elapsed, ctx.period);
        } else {
            tracing::debug!("Tick {} built and fanned out to {} subscribers", tick, members.len());
        }

        if last_metrics_emission.elapsed() >= ctx.metrics_interval {
            emit_metrics(&ctx.metrics.get_metrics());
            last_metrics_emission = Instant::now();
        }
    }

    ctx.fanout.drain().await;
    builder
}

fn emit_metrics(metrics: &SchedulerMetrics) {
    tracing::info!(
        tick = metrics.current_tick,
        avg_tick_ns = metrics.avg_tick_duration_ns,
        p99_tick_ns = metrics.p99_tick_duration_ns,
        subscribers = metrics.subscribers,
        deliveries = metrics.total_deliveries,
        dropped = metrics.dropped_deliveries,
        faults = metrics.subscriber_faults,
        "Scheduler metrics"
    );
}

fn report_fault(metrics: &MetricsCollector, error: SubscriberError) {
    metrics.record_fault();
    match &error {
        SubscriberError::Failed { .. } => tracing::warn!("{}", error),
        SubscriberError::Panicked { .. } => tracing::error!("{}", error),
    }
}

struct Worker {
    sender: mpsc::Sender<Arc<Snapshot>>,
    handle: JoinHandle<()>,
}

/// Delivers snapshots to subscribers, inline or through per-subscriber workers
struct Fanout {
    mode: DeliveryMode,
    queue_depth: usize,
    metrics: Arc<MetricsCollector>,
    shutdown: Arc<Shutdown>,
    workers: HashMap<SubscriberId, Worker>,
    retired: Vec<JoinHandle<()>>,
}

impl Fanout {
    fn new(
        mode: DeliveryMode,
        queue_depth: usize,
        metrics: Arc<MetricsCollector>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self { mode, queue_depth, metrics, shutdown, workers: HashMap::new(), retired: Vec::new() }
    }

    /// Deliver to `members`, a copy of the registry taken at tick start
    fn deliver(&mut self, members: &[Arc<Subscriber>], snapshot: Arc<Snapshot>) {
        match self.mode {
            DeliveryMode::Inline => self.deliver_inline(members, snapshot),
            DeliveryMode::Dispatched => self.dispatch(members, snapshot),
        }
    }

    fn deliver_inline(&self, members: &[Arc<Subscriber>], snapshot: Arc<Snapshot>) {
        for subscriber in members {
            if !self.shutdown.is_accepting() {
                tracing::debug!("Stop requested, abandoning delivery of tick {}", snapshot.tick);
                return;
            }
            if !subscriber.is_active() {
                continue;
            }
            let result = subscriber.deliver(snapshot.clone());
            self.metrics.record_delivery();
            if let Err(e) = result {
                report_fault(&self.metrics, e);
            }
        }
    }

    fn dispatch(&mut self, members: &[Arc<Subscriber>], snapshot: Arc<Snapshot>) {
        self.retire_departed(members);

        let queue_depth = self.queue_depth;
        let metrics = &self.metrics;
        let shutdown = &self.shutdown;
        let mut closed = Vec::new();

        for subscriber in members.iter().filter(|s| s.is_active()) {
            let worker = self.workers.entry(subscriber.id()).or_insert_with(|| {
                spawn_worker(subscriber.clone(), queue_depth, metrics.clone(), shutdown.clone())
            });

            match worker.sender.try_send(snapshot.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    metrics.record_dropped();
                    tracing::debug!(
                        "Subscriber {} queue full, dropping tick {}",
                        subscriber.id(),
                        snapshot.tick
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!("Worker for subscriber {} exited unexpectedly", subscriber.id());
                    closed.push(subscriber.id());
                }
            }
        }

        for id in closed {
            if let Some(worker) = self.workers.remove(&id) {
                self.retired.push(worker.handle);
            }
        }
    }

    /// Close workers whose subscriber has left the registry
    fn retire_departed(&mut self, members: &[Arc<Subscriber>]) {
        self.retired.retain(|handle| !handle.is_finished());

        let departed: Vec<SubscriberId> = self
            .workers
            .keys()
            .filter(|id| !members.iter().any(|s| s.id() == **id && s.is_active()))
            .copied()
            .collect();

        for id in departed {
            if let Some(worker) = self.workers.remove(&id) {
                // Dropping the sender ends the worker once its queue is empty
                drop(worker.sender);
                self.retired.push(worker.handle);
            }
        }
    }

    /// Close every worker and wait for in-flight callbacks to return
    async fn drain(&mut self) {
        let mut handles: Vec<JoinHandle<()>> = self.retired.drain(..).collect();
        handles.extend(self.workers.drain().map(|(_, worker)| worker.handle));

        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!("Delivery worker failed: {}", e);
            }
        }
    }
}

/// One async worker per subscriber, so a slow callback only delays its own
/// queue. A blocking-pool thread is held only while a callback runs.
fn spawn_worker(
    subscriber: Arc<Subscriber>,
    queue_depth: usize,
    metrics: Arc<MetricsCollector>,
    shutdown: Arc<Shutdown>,
) -> Worker {
    let (sender, mut receiver) = mpsc::channel::<Arc<Snapshot>>(queue_depth);
    tracing::debug!("Spawning delivery worker for subscriber {}", subscriber.id());

    let handle = tokio::spawn(async move {
        while let Some(snapshot) = receiver.recv().await {
            // Discard anything still queued once stop or unsubscribe is observed
            if !shutdown.is_accepting() || !subscriber.is_active() {
                continue;
            }

            let target = subscriber.clone();
            match tokio::task::spawn_blocking(move || target.deliver(snapshot)).await {
                Ok(result) => {
                    metrics.record_delivery();
                    if let Err(e) = result {
                        report_fault(&metrics, e);
                    }
                }
                Err(e) => {
                    tracing::error!("Delivery to subscriber {} aborted: {}", subscriber.id(), e);
                }
            }
        }
    });

    Worker { sender, handle }
}
