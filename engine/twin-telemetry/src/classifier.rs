//! Threshold classification of signal readings

use serde::{Deserialize, Serialize};

use crate::signals::SignalValue;
use crate::thresholds::ThresholdPolicy;

/// Alert severity of a single signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    /// No reading exists for the tag
    NoSignal,
    Ok,
    Warn,
    Alarm,
}

impl AlertLevel {
    /// Label used by dashboards and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Ok => "OK",
            AlertLevel::Warn => "WARN",
            AlertLevel::Alarm => "ALARM",
            AlertLevel::NoSignal => "NO_SIGNAL",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fraction of the band width treated as the warning margin on each edge
pub const BAND_WARN_MARGIN: f64 = 0.1;

/// Classify a reading against a policy.
///
/// Boundary values resolve to the more severe level. Absence of a reading is
/// always [`AlertLevel::NoSignal`], whatever the policy.
pub fn classify(value: Option<SignalValue>, policy: &ThresholdPolicy) -> AlertLevel {
    let Some(value) = value else {
        return AlertLevel::NoSignal;
    };

    match policy {
        ThresholdPolicy::Binary { alarm } => {
            if value.matches_binary(*alarm) {
                AlertLevel::Alarm
            } else {
                AlertLevel::Ok
            }
        }
        ThresholdPolicy::Below { warn, alarm } => {
            let v = value.as_f64();
            if v <= *alarm {
                AlertLevel::Alarm
            } else if v <= *warn {
                AlertLevel::Warn
            } else {
                AlertLevel::Ok
            }
        }
        ThresholdPolicy::OutsideBand { band, .. } => {
            let v = value.as_f64();
            if v < band.lo || v > band.hi {
                return AlertLevel::Alarm;
            }
            let margin = band.width() * BAND_WARN_MARGIN;
            if v < band.lo + margin || v > band.hi - margin {
                AlertLevel::Warn
            } else {
                AlertLevel::Ok
            }
        }
        ThresholdPolicy::Above { warn, alarm } => {
            let v = value.as_f64();
            if v >= *alarm {
                AlertLevel::Alarm
            } else if v >= *warn {
                AlertLevel::Warn
            } else {
                AlertLevel::Ok
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::Band;
    use proptest::prelude::*;

    fn num(v: f64) -> Option<SignalValue> {
        Some(SignalValue::Numeric(v))
    }

    #[test]
    fn test_above_scenario() {
        let policy = ThresholdPolicy::Above { warn: 70.0, alarm: 80.0 };
        assert_eq!(classify(num(75.0), &policy), AlertLevel::Warn);
        assert_eq!(classify(num(81.0), &policy), AlertLevel::Alarm);
        assert_eq!(classify(num(50.0), &policy), AlertLevel::Ok);
        assert_eq!(classify(None, &policy), AlertLevel::NoSignal);
    }

    #[test]
    fn test_below_scenario() {
        let policy = ThresholdPolicy::Below { warn: 1200.0, alarm: 800.0 };
        assert_eq!(classify(num(1500.0), &policy), AlertLevel::Ok);
        assert_eq!(classify(num(1000.0), &policy), AlertLevel::Warn);
        assert_eq!(classify(num(700.0), &policy), AlertLevel::Alarm);
    }

    #[test]
    fn test_outside_band_scenario() {
        let policy = ThresholdPolicy::OutsideBand {
            warn: Some(23.4),
            alarm: Some(22.8),
            band: Band { lo: 23.8, hi: 24.4 },
        };
        assert_eq!(classify(num(24.1), &policy), AlertLevel::Ok);
        assert_eq!(classify(num(23.85), &policy), AlertLevel::Warn);
        assert_eq!(classify(num(23.0), &policy), AlertLevel::Alarm);
        assert_eq!(classify(num(24.5), &policy), AlertLevel::Alarm);
    }

    #[test]
    fn test_boundaries_resolve_to_more_severe() {
        let above = ThresholdPolicy::Above { warn: 70.0, alarm: 80.0 };
        assert_eq!(classify(num(80.0), &above), AlertLevel::Alarm);
        assert_eq!(classify(num(70.0), &above), AlertLevel::Warn);

        let below = ThresholdPolicy::Below { warn: 1200.0, alarm: 800.0 };
        assert_eq!(classify(num(800.0), &below), AlertLevel::Alarm);
        assert_eq!(classify(num(1200.0), &below), AlertLevel::Warn);

        // The band edges themselves are inside the band, so they only warn
        let band = ThresholdPolicy::OutsideBand {
            warn: None,
            alarm: None,
            band: Band { lo: 10.0, hi: 20.0 },
        };
        assert_eq!(classify(num(10.0), &band), AlertLevel::Warn);
        assert_eq!(classify(num(20.0), &band), AlertLevel::Warn);
    }

    #[test]
    fn test_binary_never_warns() {
        let smoke = ThresholdPolicy::Binary { alarm: true };
        assert_eq!(classify(Some(SignalValue::Binary(true)), &smoke), AlertLevel::Alarm);
        assert_eq!(classify(Some(SignalValue::Binary(false)), &smoke), AlertLevel::Ok);
        assert_eq!(classify(num(1.0), &smoke), AlertLevel::Alarm);
        assert_eq!(classify(num(0.0), &smoke), AlertLevel::Ok);

        let link_ok = ThresholdPolicy::Binary { alarm: false };
        assert_eq!(classify(Some(SignalValue::Binary(false)), &link_ok), AlertLevel::Alarm);
        assert_eq!(classify(Some(SignalValue::Binary(true)), &link_ok), AlertLevel::Ok);
    }

    #[test]
    fn test_alert_level_labels() {
        assert_eq!(AlertLevel::NoSignal.to_string(), "NO_SIGNAL");
        assert_eq!(serde_json::to_string(&AlertLevel::Warn).unwrap(), "\"WARN\"");
        assert!(AlertLevel::Alarm > AlertLevel::Warn);
        assert!(AlertLevel::Warn > AlertLevel::Ok);
    }

    proptest! {
        #[test]
        fn prop_above_matches_definition(v in -1000.0f64..1000.0, warn in -500.0f64..500.0, gap in 0.001f64..500.0) {
            let alarm = warn + gap;
            let level = classify(num(v), &ThresholdPolicy::Above { warn, alarm });
            let expected = if v >= alarm {
                AlertLevel::Alarm
            } else if v >= warn {
                AlertLevel::Warn
            } else {
                AlertLevel::Ok
            };
            prop_assert_eq!(level, expected);
        }

        #[test]
        fn prop_below_matches_definition(v in -1000.0f64..1000.0, alarm in -500.0f64..500.0, gap in 0.001f64..500.0) {
            let warn = alarm + gap;
            let level = classify(num(v), &ThresholdPolicy::Below { warn, alarm });
            let expected = if v <= alarm {
                AlertLevel::Alarm
            } else if v <= warn {
                AlertLevel::Warn
            } else {
                AlertLevel::Ok
            };
            prop_assert_eq!(level, expected);
        }

        #[test]
        fn prop_band_matches_definition(v in -100.0f64..100.0, lo in -50.0f64..50.0, width in 0.01f64..50.0) {
            let hi = lo + width;
            let policy = ThresholdPolicy::OutsideBand { warn: None, alarm: None, band: Band { lo, hi } };
            let margin = (hi - lo) * 0.1;
            let level = classify(num(v), &policy);
            if v < lo || v > hi {
                prop_assert_eq!(level, AlertLevel::Alarm);
            } else if v < lo + margin || v > hi - margin {
                prop_assert_eq!(level, AlertLevel::Warn);
            } else {
                prop_assert_eq!(level, AlertLevel::Ok);
            }
        }

        #[test]
        fn prop_absent_is_no_signal(warn in -10.0f64..10.0, alarm in -10.0f64..10.0, binary in any::<bool>()) {
            for policy in [
                ThresholdPolicy::Above { warn, alarm },
                ThresholdPolicy::Below { warn, alarm },
                ThresholdPolicy::Binary { alarm: binary },
                ThresholdPolicy::OutsideBand { warn: None, alarm: None, band: Band { lo: -20.0, hi: 20.0 } },
            ] {
                prop_assert_eq!(classify(None, &policy), AlertLevel::NoSignal);
            }
        }
    }
}
