//! Plant-level aggregates published alongside each snapshot: KPIs, the
//! trailing energy profile and the QC station summary.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::assets::Asset;

/// Headline KPIs for the plant overview
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    /// Mean OEE across all assets
    pub plant_oee: f64,
    /// Good units per shift hour
    pub throughput: f64,
    pub wip: u32,
    /// Takt time over actual cycle time, in percent
    pub takt_vs_cycle: f64,
    /// kWh per panel
    pub energy_intensity: f64,
    /// First pass yield, percent
    pub fpy: f64,
    /// On-time delivery, percent
    pub otd: f64,
    pub safety_days: u32,
    /// Recent plant OEE values, oldest first, ending with this tick's value
    pub trend: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyPoint {
    pub timestamp: DateTime<Utc>,
    pub kw: f64,
    pub kwh: f64,
    pub pf: f64,
    pub thd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectCount {
    pub kind: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityStation {
    pub station: String,
    pub pass_rate: f64,
    pub defect_rate: f64,
    pub rework_rate: f64,
    pub top_defects: Vec<DefectCount>,
}

pub const QC_STATIONS: [&str; 5] = ["Laser Cut QC", "Bend QC", "Paint QC", "Assembly QC", "Final Test"];
pub const DEFECT_TYPES: [&str; 5] = ["Dimension", "Surface", "Electrical", "Mechanical", "Visual"];

const ENERGY_POINTS: i64 = 24;
const BASE_LOAD_KW: f64 = 850.0;

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Mean OEE of the given assets, 0 when there are none
pub fn plant_oee(assets: &[Asset]) -> f64 {
    if assets.is_empty() {
        return 0.0;
    }
    assets.iter().map(|a| a.oee).sum::<f64>() / assets.len() as f64
}

/// Derive the KPI card values from this tick's assets.
///
/// `history` holds previous plant OEE values; the current one is appended to
/// the returned trend.
pub fn summarize_kpis<R: Rng + ?Sized>(
    assets: &[Asset],
    shift_hours: f64,
    history: &[f64],
    rng: &mut R,
) -> KpiSummary {
    let oee = round_to(plant_oee(assets), 1);
    let good: u64 = assets.iter().map(|a| a.good_count).sum();

    let mut trend = history.to_vec();
    trend.push(oee);

    KpiSummary {
        plant_oee: oee,
        throughput: round_to(good as f64 / shift_hours, 1),
        wip: (rng.gen::<f64>() * 50.0 + 120.0) as u32,
        takt_vs_cycle: round_to((0.85 + rng.gen::<f64>() * 0.3) * 100.0, 1),
        energy_intensity: round_to(12.0 + rng.gen::<f64>() * 4.0, 1),
        fpy: round_to((0.92 + rng.gen::<f64>() * 0.07) * 100.0, 1),
        otd: round_to((0.88 + rng.gen::<f64>() * 0.1) * 100.0, 1),
        safety_days: (rng.gen::<f64>() * 100.0 + 45.0) as u32,
        trend,
    }
}

/// Hourly load profile for the 24 hours ending at `now`
pub fn energy_profile<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> Vec<EnergyPoint> {
    (0..ENERGY_POINTS)
        .map(|i| {
            let timestamp = now - Duration::hours(ENERGY_POINTS - 1 - i);
            let daily = (i as f64 * std::f64::consts::PI / 12.0).sin() * 200.0;
            let noise = (rng.gen::<f64>() - 0.5) * 100.0;
            let kw = (BASE_LOAD_KW + daily + noise).round();
            EnergyPoint {
                timestamp,
                kw,
                // One-hour buckets
                kwh: kw,
                pf: round_to(0.85 + rng.gen::<f64>() * 0.1, 2),
                thd: round_to(2.0 + rng.gen::<f64>() * 3.0, 1),
            }
        })
        .collect()
}

/// Pass/defect/rework rates and the three most frequent defects per QC station
pub fn quality_summary<R: Rng + ?Sized>(rng: &mut R) -> Vec<QualityStation> {
    QC_STATIONS
        .iter()
        .map(|station| {
            let pass_rate = round_to((0.92 + rng.gen::<f64>() * 0.07) * 100.0, 1);
            let defect_rate = round_to((0.01 + rng.gen::<f64>() * 0.06) * 100.0, 1);
            let rework_rate = round_to((0.02 + rng.gen::<f64>() * 0.04) * 100.0, 1);

            let mut defects: Vec<DefectCount> = DEFECT_TYPES
                .iter()
                .map(|kind| DefectCount {
                    kind: kind.to_string(),
                    count: rng.gen_range(1..=15),
                })
                .collect();
            defects.sort_by(|a, b| b.count.cmp(&a.count));
            defects.truncate(3);

            QualityStation {
                station: station.to_string(),
                pass_rate,
                defect_rate,
                rework_rate,
                top_defects: defects,
            }
        })
        .collect()
}
