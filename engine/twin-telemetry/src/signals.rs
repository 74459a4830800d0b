//! Synthetic panel signal generation

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::TrendMode;
use crate::error::ConfigError;

/// A single reading value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Numeric(f64),
    Binary(bool),
}

impl SignalValue {
    /// Numeric view; binary readings map to 0.0 / 1.0
    pub fn as_f64(&self) -> f64 {
        match *self {
            SignalValue::Numeric(v) => v,
            SignalValue::Binary(true) => 1.0,
            SignalValue::Binary(false) => 0.0,
        }
    }

    /// Exact equality against a binary state
    pub fn matches_binary(&self, state: bool) -> bool {
        match *self {
            SignalValue::Binary(b) => b == state,
            SignalValue::Numeric(v) => v == if state { 1.0 } else { 0.0 },
        }
    }
}

/// One reading of one tag on one tick. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub tag: String,
    pub value: SignalValue,
    pub timestamp: DateTime<Utc>,
    /// Signed rate of change in units per minute
    pub trend: f64,
}

/// Waveform parameters of a tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalShape {
    /// `base + amplitude * sin(t_ms * omega) + U[0, noise)`
    Analog {
        base: f64,
        amplitude: f64,
        /// Angular frequency in radians per millisecond
        omega: f64,
        noise: f64,
        /// Full width of the random trend, centred on zero
        trend_span: f64,
    },
    /// Nominal state with an independent per-tick fault probability
    Binary { nominal: bool, fault_probability: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalProfile {
    pub tag: String,
    #[serde(flatten)]
    pub shape: SignalShape,
}

impl SignalProfile {
    pub fn analog(
        tag: &str,
        base: f64,
        amplitude: f64,
        omega: f64,
        noise: f64,
        trend_span: f64,
    ) -> Self {
        Self {
            tag: tag.to_string(),
            shape: SignalShape::Analog { base, amplitude, omega, noise, trend_span },
        }
    }

    pub fn binary(tag: &str, nominal: bool, fault_probability: f64) -> Self {
        Self { tag: tag.to_string(), shape: SignalShape::Binary { nominal, fault_probability } }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.shape {
            SignalShape::Analog { base, amplitude, omega, noise, trend_span } => {
                let all_finite =
                    [base, amplitude, omega, noise, trend_span].iter().all(|v| v.is_finite());
                if !all_finite || noise < 0.0 || trend_span < 0.0 {
                    return Err(ConfigError::InvalidValue {
                        field: "signal profile",
                        reason: format!("{} has non-finite or negative parameters", self.tag),
                    });
                }
            }
            SignalShape::Binary { fault_probability, .. } => {
                if !(0.0..=1.0).contains(&fault_probability) {
                    return Err(ConfigError::InvalidValue {
                        field: "fault_probability",
                        reason: format!("{} has probability {}", self.tag, fault_probability),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Produces one synthetic reading per configured tag per tick
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    profiles: Vec<SignalProfile>,
    trend_mode: TrendMode,
}

impl SignalGenerator {
    pub fn new(profiles: Vec<SignalProfile>, trend_mode: TrendMode) -> Result<Self, ConfigError> {
        for profile in &profiles {
            profile.validate()?;
        }
        Ok(Self { profiles, trend_mode })
    }

    /// Generator over the built-in panel sensor table
    pub fn panel_default(trend_mode: TrendMode) -> Self {
        Self { profiles: default_profiles(), trend_mode }
    }

    pub fn profiles(&self) -> &[SignalProfile] {
        &self.profiles
    }

    pub fn profile(&self, tag: &str) -> Option<&SignalProfile> {
        self.profiles.iter().find(|p| p.tag == tag)
    }

    /// Reading for a single profile at `now`
    pub fn generate<R: Rng + ?Sized>(
        &self,
        profile: &SignalProfile,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Signal {
        let t_ms = now.timestamp_millis() as f64;

        let (value, trend) = match profile.shape {
            SignalShape::Analog { base, amplitude, omega, noise, trend_span } => {
                let phase = t_ms * omega;
                let value = base + phase.sin() * amplitude + rng.gen::<f64>() * noise;
                let trend = match self.trend_mode {
                    TrendMode::Random => (rng.gen::<f64>() - 0.5) * trend_span,
                    TrendMode::Derivative => amplitude * omega * phase.cos() * 60_000.0,
                };
                (SignalValue::Numeric(value), trend)
            }
            SignalShape::Binary { nominal, fault_probability } => {
                let faulted = rng.gen::<f64>() < fault_probability;
                (SignalValue::Binary(if faulted { !nominal } else { nominal }), 0.0)
            }
        };

        Signal { tag: profile.tag.clone(), value, timestamp: now, trend }
    }

    /// Reading for `tag`, or `None` if the tag is not configured
    pub fn generate_tag<R: Rng + ?Sized>(
        &self,
        tag: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Option<Signal> {
        self.profile(tag).map(|profile| self.generate(profile, now, rng))
    }

    /// Readings for every configured tag, drawn in table order
    pub fn generate_all<R: Rng + ?Sized>(
        &self,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> BTreeMap<String, Signal> {
        self.profiles
            .iter()
            .map(|profile| (profile.tag.clone(), self.generate(profile, now, rng)))
            .collect()
    }
}

/// Panel sensor waveforms
pub fn default_profiles() -> Vec<SignalProfile> {
    vec![
        SignalProfile::analog("panel.busbar.r.temp_c", 65.0, 8.0, 0.001, 3.0, 2.0),
        SignalProfile::analog("panel.busbar.y.temp_c", 63.0, 7.0, 0.0012, 3.0, 2.0),
        SignalProfile::analog("panel.busbar.b.temp_c", 67.0, 9.0, 0.0008, 3.0, 2.0),
        SignalProfile::analog("panel.main_feeder.current_a", 320.0, 40.0, 0.002, 20.0, 5.0),
        SignalProfile::analog("panel.power.factor", 0.94, 0.06, 0.0015, 0.02, 0.1),
        SignalProfile::analog("panel.cooling.fan_rpm", 1400.0, 200.0, 0.0025, 100.0, 50.0),
        SignalProfile::analog("panel.ambient.temp_c", 32.0, 6.0, 0.0005, 2.0, 1.0),
        SignalProfile::analog("panel.ambient.rh_pct", 55.0, 15.0, 0.0008, 5.0, 3.0),
        SignalProfile::binary("panel.safety.smoke", false, 0.05),
        SignalProfile::binary("panel.safety.door_open", false, 0.02),
        SignalProfile::analog("panel.vfd.heatsink_c", 58.0, 12.0, 0.003, 4.0, 3.0),
        SignalProfile::analog("panel.psu.v_out", 24.1, 0.3, 0.01, 0.1, 0.2),
        SignalProfile::binary("panel.plc.link_ok", true, 0.01),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_same_seed_same_readings() {
        let generator = SignalGenerator::panel_default(TrendMode::Random);
        let now = at(1_700_000_000_000);

        let a = generator.generate_all(now, &mut ChaCha8Rng::seed_from_u64(42));
        let b = generator.generate_all(now, &mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(a, b);
        assert_eq!(a.len(), 13);
    }

    #[test]
    fn test_analog_value_is_bounded() {
        let generator = SignalGenerator::panel_default(TrendMode::Random);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for step in 0..500 {
            let now = at(1_700_000_000_000 + step * 997);
            let signal = generator.generate_tag("panel.busbar.r.temp_c", now, &mut rng).unwrap();
            let v = signal.value.as_f64();
            assert!((57.0..76.0).contains(&v), "value {v} out of range");
            assert!(signal.trend.abs() <= 1.0);
            assert_eq!(signal.timestamp, now);
        }
    }

    #[test]
    fn test_binary_fault_injection() {
        let generator = SignalGenerator::new(
            vec![
                SignalProfile::binary("always", false, 1.0),
                SignalProfile::binary("never", true, 0.0),
            ],
            TrendMode::Random,
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let now = at(0);

        for _ in 0..100 {
            let readings = generator.generate_all(now, &mut rng);
            assert_eq!(readings["always"].value, SignalValue::Binary(true));
            assert_eq!(readings["never"].value, SignalValue::Binary(true));
            assert_eq!(readings["always"].trend, 0.0);
        }
    }

    #[test]
    fn test_binary_fault_rate() {
        let generator = SignalGenerator::panel_default(TrendMode::Random);
        let profile = generator.profile("panel.safety.smoke").unwrap().clone();
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let now = at(0);

        let draws = 20_000;
        let alarms = (0..draws)
            .filter(|_| generator.generate(&profile, now, &mut rng).value.matches_binary(true))
            .count();
        let rate = alarms as f64 / draws as f64;
        assert!((rate - 0.05).abs() < 0.01, "fault rate {rate}");
    }

    #[test]
    fn test_derivative_trend_follows_waveform() {
        let generator = SignalGenerator::new(
            vec![SignalProfile::analog("wave", 0.0, 10.0, 0.001, 0.0, 0.0)],
            TrendMode::Derivative,
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        // sin has its steepest rise at t = 0
        let signal = generator.generate_tag("wave", at(0), &mut rng).unwrap();
        assert!((signal.trend - 600.0).abs() < 1e-9);
        assert!(signal.value.as_f64().abs() < 1e-12);
    }

    #[test]
    fn test_unknown_tag() {
        let generator = SignalGenerator::panel_default(TrendMode::Random);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(generator.generate_tag("panel.nope", at(0), &mut rng).is_none());
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        let bad_probability = SignalGenerator::new(
            vec![SignalProfile::binary("x", true, 1.5)],
            TrendMode::Random,
        );
        assert!(matches!(bad_probability, Err(ConfigError::InvalidValue { .. })));

        let bad_noise = SignalGenerator::new(
            vec![SignalProfile::analog("x", 1.0, 1.0, 0.1, -1.0, 0.0)],
            TrendMode::Random,
        );
        assert!(bad_noise.is_err());
    }
}
