//! Plant asset state sampling

use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Operating state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MachineState {
    Running,
    Idle,
    Changeover,
    Down,
    Setup,
    QaHold,
}

impl MachineState {
    /// Sampling order; matches the field order of [`StateWeights`]
    pub const ALL: [MachineState; 6] = [
        MachineState::Running,
        MachineState::Idle,
        MachineState::Changeover,
        MachineState::Down,
        MachineState::Setup,
        MachineState::QaHold,
    ];

    /// OEE offset applied to the plant baseline
    pub fn oee_modifier(&self) -> f64 {
        match self {
            MachineState::Running => 0.0,
            MachineState::Idle => -10.0,
            MachineState::Changeover => -30.0,
            MachineState::Down => -75.0,
            MachineState::Setup => -50.0,
            MachineState::QaHold => -20.0,
        }
    }

    /// Cycle time multiplier; zero means the asset is not producing
    pub fn cycle_multiplier(&self) -> f64 {
        match self {
            MachineState::Running => 1.0,
            MachineState::Idle => 0.0,
            MachineState::Changeover => 2.5,
            MachineState::Down => 0.0,
            MachineState::Setup => 1.8,
            MachineState::QaHold => 1.2,
        }
    }

    pub fn is_producing(&self) -> bool {
        !matches!(self, MachineState::Idle | MachineState::Down)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Running => "running",
            MachineState::Idle => "idle",
            MachineState::Changeover => "changeover",
            MachineState::Down => "down",
            MachineState::Setup => "setup",
            MachineState::QaHold => "qa-hold",
        }
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical weights of the operating states. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateWeights {
    pub running: f64,
    pub idle: f64,
    pub changeover: f64,
    pub down: f64,
    pub setup: f64,
    pub qa_hold: f64,
}

impl Default for StateWeights {
    fn default() -> Self {
        Self { running: 0.65, idle: 0.15, changeover: 0.08, down: 0.05, setup: 0.05, qa_hold: 0.02 }
    }
}

impl StateWeights {
    const SUM_TOLERANCE: f64 = 1e-6;

    pub fn as_array(&self) -> [f64; 6] {
        [self.running, self.idle, self.changeover, self.down, self.setup, self.qa_hold]
    }

    pub fn weight(&self, state: MachineState) -> f64 {
        match state {
            MachineState::Running => self.running,
            MachineState::Idle => self.idle,
            MachineState::Changeover => self.changeover,
            MachineState::Down => self.down,
            MachineState::Setup => self.setup,
            MachineState::QaHold => self.qa_hold,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = self.as_array();
        let sum: f64 = weights.iter().sum();
        let well_formed = weights.iter().all(|w| w.is_finite() && *w >= 0.0);
        if !well_formed || (sum - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(ConfigError::InvalidStateWeights { sum });
        }
        Ok(())
    }
}

/// Static description of a plant asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDef {
    pub id: String,
    pub name: String,
    pub area: String,
    pub line: String,
}

impl AssetDef {
    pub fn new(id: &str, name: &str, area: &str, line: &str) -> Self {
        Self { id: id.into(), name: name.into(), area: area.into(), line: line.into() }
    }
}

/// One tick's view of an asset. Regenerated wholesale every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub area: String,
    pub line: String,
    pub state: MachineState,
    /// Overall equipment effectiveness, 0-100, one decimal
    pub oee: f64,
    pub current_job: String,
    pub operator: String,
    /// Minutes until the current job completes; only while running
    pub eta_minutes: Option<u32>,
    /// Seconds per unit; exactly 0 while idle or down
    pub cycle_time: f64,
    pub ideal_cycle_time: f64,
    pub good_count: u64,
    pub total_count: u64,
    /// Minutes of unplanned downtime; only while down
    pub downtime: u32,
    pub last_update: DateTime<Utc>,
}

pub const JOB_TYPES: [&str; 5] = ["Panel-LT-100A", "Panel-MV-630A", "Panel-HT-1600A", "DB-415V", "PCC-LT"];
pub const OPERATORS: [&str; 5] = ["Raj Kumar", "Priya Singh", "Amit Sharma", "Neha Patel", "Suresh Yadav"];

const BASE_OEE: f64 = 75.0;
const OEE_NOISE: f64 = 10.0;
const CYCLE_TIME_NOISE: f64 = 0.1;

/// Weighted categorical sampler of asset states and their derived metrics
#[derive(Debug, Clone)]
pub struct AssetStateSampler {
    weights: StateWeights,
    distribution: WeightedIndex<f64>,
    shift_seconds: f64,
    ideal_cycle_range: (f64, f64),
}

impl AssetStateSampler {
    pub fn new(
        weights: StateWeights,
        shift_hours: f64,
        ideal_cycle_range: (f64, f64),
    ) -> Result<Self, ConfigError> {
        weights.validate()?;

        let (min, max) = ideal_cycle_range;
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= max) {
            return Err(ConfigError::InvalidCycleTimeRange { min, max });
        }
        if !(shift_hours.is_finite() && shift_hours > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "shift_hours",
                reason: format!("{shift_hours} is not a positive number of hours"),
            });
        }

        let distribution = WeightedIndex::new(weights.as_array())
            .map_err(|_| ConfigError::InvalidStateWeights { sum: weights.as_array().iter().sum() })?;

        Ok(Self { weights, distribution, shift_seconds: shift_hours * 3600.0, ideal_cycle_range })
    }

    pub fn weights(&self) -> &StateWeights {
        &self.weights
    }

    pub fn shift_seconds(&self) -> f64 {
        self.shift_seconds
    }

    /// Draw one operating state
    pub fn sample_state<R: Rng + ?Sized>(&self, rng: &mut R) -> MachineState {
        MachineState::ALL[self.distribution.sample(rng)]
    }

    /// Resample an asset from scratch
    pub fn sample<R: Rng + ?Sized>(&self, def: &AssetDef, now: DateTime<Utc>, rng: &mut R) -> Asset {
        let state = self.sample_state(rng);

        let (min, max) = self.ideal_cycle_range;
        let ideal_cycle_time = min + rng.gen::<f64>() * (max - min);

        let oee = (BASE_OEE + state.oee_modifier() + (rng.gen::<f64>() - 0.5) * OEE_NOISE)
            .clamp(0.0, 100.0);

        let cycle_time = if state.is_producing() {
            let base = ideal_cycle_time * state.cycle_multiplier();
            base * (1.0 + CYCLE_TIME_NOISE * (rng.gen::<f64>() - 0.5))
        } else {
            0.0
        };

        let theoretical_count = self.shift_seconds / ideal_cycle_time;
        let total_count =
            (theoretical_count * (oee / 100.0) * (0.8 + rng.gen::<f64>() * 0.4)).floor() as u64;
        let quality_rate = 0.92 + rng.gen::<f64>() * 0.07;
        let good_count = ((total_count as f64 * quality_rate).floor() as u64).min(total_count);

        let current_job = JOB_TYPES[rng.gen_range(0..JOB_TYPES.len())].to_string();
        let operator = OPERATORS[rng.gen_range(0..OPERATORS.len())].to_string();
        let eta_minutes =
            (state == MachineState::Running).then(|| (rng.gen::<f64>() * 120.0 + 30.0) as u32);
        let downtime =
            if state == MachineState::Down { (rng.gen::<f64>() * 180.0 + 10.0) as u32 } else { 0 };

        Asset {
            id: def.id.clone(),
            name: def.name.clone(),
            area: def.area.clone(),
            line: def.line.clone(),
            state,
            oee: (oee * 10.0).round() / 10.0,
            current_job,
            operator,
            eta_minutes,
            cycle_time: cycle_time.round(),
            ideal_cycle_time: ideal_cycle_time.round(),
            good_count,
            total_count,
            downtime,
            last_update: now,
        }
    }
}

/// Assets of the panel manufacturing plant
pub fn default_assets() -> Vec<AssetDef> {
    vec![
        AssetDef::new("laser_01", "Laser Cutting 01", "Sheet Metal", "Line A"),
        AssetDef::new("laser_02", "Laser Cutting 02", "Sheet Metal", "Line A"),
        AssetDef::new("pressbrake_01", "Press Brake 01", "Sheet Metal", "Line A"),
        AssetDef::new("pressbrake_02", "Press Brake 02", "Sheet Metal", "Line B"),
        AssetDef::new("busbar_cut_01", "Busbar Cutting", "Busbar Shop", "Line C"),
        AssetDef::new("busbar_bend_01", "Busbar Bending", "Busbar Shop", "Line C"),
        AssetDef::new("booth_01", "Paint Booth 01", "Powder Coating", "Line D"),
        AssetDef::new("booth_02", "Paint Booth 02", "Powder Coating", "Line D"),
        AssetDef::new("oven_01", "Cure Oven 01", "Powder Coating", "Line D"),
        AssetDef::new("assembly_stn_01", "Assembly Station 01", "Assembly", "Line E"),
        AssetDef::new("assembly_stn_02", "Assembly Station 02", "Assembly", "Line E"),
        AssetDef::new("assembly_stn_03", "Assembly Station 03", "Assembly", "Line F"),
        AssetDef::new("assembly_stn_04", "Assembly Station 04", "Assembly", "Line F"),
        AssetDef::new("fat_01", "FAT Station 01", "Testing", "Line G"),
        AssetDef::new("fat_02", "FAT Station 02", "Testing", "Line G"),
        AssetDef::new("compressor_01", "Air Compressor 01", "Utilities", "Support"),
        AssetDef::new("chiller_01", "Chiller 01", "Utilities", "Support"),
        AssetDef::new("main_feeder_A", "Main Feeder A", "Utilities", "Electrical"),
        AssetDef::new("main_feeder_B", "Main Feeder B", "Utilities", "Electrical"),
    ]
}
