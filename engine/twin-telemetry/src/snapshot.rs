//! Immutable per-tick snapshots and the builder that produces them

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::assets::{default_assets, Asset, AssetDef, AssetStateSampler};
use crate::classifier::{classify, AlertLevel};
use crate::config::SimulatorConfig;
use crate::error::ConfigError;
use crate::plant::{self, EnergyPoint, KpiSummary, QualityStation};
use crate::signals::{Signal, SignalGenerator, SignalValue};
use crate::thresholds::ThresholdTable;

/// Everything produced on one tick. Shared read-only as `Arc<Snapshot>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub generated_at: DateTime<Utc>,
    pub signals: BTreeMap<String, Signal>,
    pub assets: Vec<Asset>,
    /// Classification of every tag in the threshold table
    pub alerts: BTreeMap<String, AlertLevel>,
    pub kpis: KpiSummary,
    pub energy: Vec<EnergyPoint>,
    pub quality: Vec<QualityStation>,
}

impl Snapshot {
    /// Snapshot with no signals or assets
    pub fn empty(tick: u64) -> Self {
        Self {
            tick,
            generated_at: Utc::now(),
            signals: BTreeMap::new(),
            assets: Vec::new(),
            alerts: BTreeMap::new(),
            kpis: KpiSummary::default(),
            energy: Vec::new(),
            quality: Vec::new(),
        }
    }

    pub fn signal(&self, tag: &str) -> Option<&Signal> {
        self.signals.get(tag)
    }

    pub fn value(&self, tag: &str) -> Option<SignalValue> {
        self.signals.get(tag).map(|s| s.value)
    }

    /// Alert level of `tag`; tags without a policy are `NoSignal`
    pub fn alert(&self, tag: &str) -> AlertLevel {
        self.alerts.get(tag).copied().unwrap_or(AlertLevel::NoSignal)
    }

    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    pub fn alert_summary(&self) -> AlertSummary {
        AlertSummary::from_levels(self.alerts.values().copied())
    }
}

/// Per-level counts over a snapshot's alert map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub ok: usize,
    pub warn: usize,
    pub alarm: usize,
    pub no_signal: usize,
}

impl AlertSummary {
    pub fn from_levels(levels: impl IntoIterator<Item = AlertLevel>) -> Self {
        let mut summary = Self::default();
        for level in levels {
            match level {
                AlertLevel::Ok => summary.ok += 1,
                AlertLevel::Warn => summary.warn += 1,
                AlertLevel::Alarm => summary.alarm += 1,
                AlertLevel::NoSignal => summary.no_signal += 1,
            }
        }
        summary
    }

    /// Most severe level present
    pub fn worst(&self) -> AlertLevel {
        if self.alarm > 0 {
            AlertLevel::Alarm
        } else if self.warn > 0 {
            AlertLevel::Warn
        } else if self.ok > 0 {
            AlertLevel::Ok
        } else {
            AlertLevel::NoSignal
        }
    }
}

/// Owns the generators and random source; builds one snapshot per call
#[derive(Debug)]
pub struct SnapshotBuilder {
    signals: SignalGenerator,
    sampler: AssetStateSampler,
    assets: Vec<AssetDef>,
    thresholds: Arc<ThresholdTable>,
    rng: ChaCha8Rng,
    shift_hours: f64,
    oee_history: VecDeque<f64>,
    history_len: usize,
    next_tick: u64,
}

impl SnapshotBuilder {
    pub fn new(
        signals: SignalGenerator,
        sampler: AssetStateSampler,
        assets: Vec<AssetDef>,
        thresholds: Arc<ThresholdTable>,
        rng: ChaCha8Rng,
    ) -> Self {
        let shift_hours = sampler.shift_seconds() / 3600.0;
        Self {
            signals,
            sampler,
            assets,
            thresholds,
            rng,
            shift_hours,
            oee_history: VecDeque::new(),
            history_len: crate::DEFAULT_KPI_HISTORY_LEN,
            next_tick: 1,
        }
    }

    /// Builder over the built-in panel signals and plant assets
    pub fn from_config(
        config: &SimulatorConfig,
        thresholds: Arc<ThresholdTable>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let sampler = AssetStateSampler::new(
            config.state_weights,
            config.shift_hours,
            config.ideal_cycle_time_s,
        )?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut builder = Self::new(
            SignalGenerator::panel_default(config.trend_mode),
            sampler,
            default_assets(),
            thresholds,
            rng,
        );
        builder.history_len = config.kpi_history_len;
        Ok(builder)
    }

    pub fn thresholds(&self) -> &Arc<ThresholdTable> {
        &self.thresholds
    }

    /// Number of the tick the next call to [`build`](Self::build) produces
    pub fn next_tick(&self) -> u64 {
        self.next_tick
    }

    /// Resample every signal and asset at `now`
    pub fn build(&mut self, now: DateTime<Utc>) -> Snapshot {
        let tick = self.next_tick;
        self.next_tick += 1;

        let signals = self.signals.generate_all(now, &mut self.rng);

        let assets: Vec<Asset> =
            self.assets.iter().map(|def| self.sampler.sample(def, now, &mut self.rng)).collect();

        let alerts = self
            .thresholds
            .iter()
            .map(|(tag, policy)| {
                (tag.to_string(), classify(signals.get(tag).map(|s| s.value), policy))
            })
            .collect();

        let keep = self.history_len.saturating_sub(1);
        let skip = self.oee_history.len().saturating_sub(keep);
        let previous: Vec<f64> = self.oee_history.iter().skip(skip).copied().collect();
        let kpis = plant::summarize_kpis(&assets, self.shift_hours, &previous, &mut self.rng);

        self.oee_history.push_back(kpis.plant_oee);
        while self.oee_history.len() > self.history_len {
            self.oee_history.pop_front();
        }

        let energy = plant::energy_profile(now, &mut self.rng);
        let quality = plant::quality_summary(&mut self.rng);

        Snapshot { tick, generated_at: now, signals, assets, alerts, kpis, energy, quality }
    }
}
