//! Per-tag threshold policies and the static threshold table

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::{classify, AlertLevel};
use crate::error::ConfigError;
use crate::signals::SignalValue;

/// Closed numeric band `[lo, hi]` with `lo < hi`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub lo: f64,
    pub hi: f64,
}

impl Band {
    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }
}

/// Validated threshold policy for one signal tag.
///
/// Only well-formed policies can be represented: a band exists exactly for
/// `OutsideBand`, and binary policies carry no warn level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdPolicy {
    /// Higher values are worse (default direction)
    Above { warn: f64, alarm: f64 },
    /// Lower values are worse
    Below { warn: f64, alarm: f64 },
    /// Values leaving the band alarm; warn/alarm are kept for display only
    OutsideBand { warn: Option<f64>, alarm: Option<f64>, band: Band },
    /// Alarm when the reading equals the alarm state
    Binary { alarm: bool },
}

/// Raw policy as written in configuration files, using the dashboard field names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<[f64; 2]>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl PolicySpec {
    pub fn above(warn: f64, alarm: f64) -> Self {
        Self { warn: Some(warn), alarm: Some(alarm), ..Default::default() }
    }

    pub fn below(warn: f64, alarm: f64) -> Self {
        Self {
            warn: Some(warn),
            alarm: Some(alarm),
            direction: Some("below".to_string()),
            ..Default::default()
        }
    }

    pub fn outside_band(warn: f64, alarm: f64, lo: f64, hi: f64) -> Self {
        Self {
            warn: Some(warn),
            alarm: Some(alarm),
            direction: Some("outside_band".to_string()),
            band: Some([lo, hi]),
            kind: None,
        }
    }

    pub fn binary(alarm: f64) -> Self {
        Self { alarm: Some(alarm), kind: Some("binary".to_string()), ..Default::default() }
    }

    /// Validate the raw spec into a policy for `tag`
    pub fn into_policy(self, tag: &str) -> Result<ThresholdPolicy, ConfigError> {
        let tag_owned = || tag.to_string();

        for (field, value) in [("warn", self.warn), ("alarm", self.alarm)] {
            if matches!(value, Some(v) if !v.is_finite()) {
                return Err(ConfigError::NonFinite { tag: tag_owned(), field });
            }
        }
        if let Some([lo, hi]) = self.band {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(ConfigError::NonFinite { tag: tag_owned(), field: "band" });
            }
        }

        match self.kind.as_deref() {
            Some("binary") => {
                if self.warn.is_some() {
                    return Err(ConfigError::BinaryConflict { tag: tag_owned(), field: "warn" });
                }
                if self.direction.is_some() {
                    return Err(ConfigError::BinaryConflict { tag: tag_owned(), field: "direction" });
                }
                if self.band.is_some() {
                    return Err(ConfigError::BinaryConflict { tag: tag_owned(), field: "band" });
                }
                let value = self
                    .alarm
                    .ok_or(ConfigError::MissingThreshold { tag: tag_owned(), field: "alarm" })?;
                let alarm = if value == 1.0 {
                    true
                } else if value == 0.0 {
                    false
                } else {
                    return Err(ConfigError::InvalidBinaryAlarm { tag: tag_owned(), value });
                };
                return Ok(ThresholdPolicy::Binary { alarm });
            }
            Some(other) => {
                return Err(ConfigError::UnknownPolicyType {
                    tag: tag_owned(),
                    kind: other.to_string(),
                })
            }
            None => {}
        }

        let direction = self.direction.as_deref().unwrap_or("above");
        if direction == "outside_band" {
            let [lo, hi] =
                self.band.ok_or(ConfigError::MissingBand { tag: tag_owned() })?;
            if lo >= hi {
                return Err(ConfigError::InvalidBand { tag: tag_owned(), lo, hi });
            }
            return Ok(ThresholdPolicy::OutsideBand {
                warn: self.warn,
                alarm: self.alarm,
                band: Band { lo, hi },
            });
        }

        if self.band.is_some() {
            return Err(ConfigError::UnexpectedBand { tag: tag_owned() });
        }
        let warn =
            self.warn.ok_or(ConfigError::MissingThreshold { tag: tag_owned(), field: "warn" })?;
        let alarm =
            self.alarm.ok_or(ConfigError::MissingThreshold { tag: tag_owned(), field: "alarm" })?;

        match direction {
            "above" => Ok(ThresholdPolicy::Above { warn, alarm }),
            "below" => Ok(ThresholdPolicy::Below { warn, alarm }),
            other => Err(ConfigError::UnknownDirection {
                tag: tag_owned(),
                direction: other.to_string(),
            }),
        }
    }
}

impl From<&ThresholdPolicy> for PolicySpec {
    fn from(policy: &ThresholdPolicy) -> Self {
        match *policy {
            ThresholdPolicy::Above { warn, alarm } => PolicySpec::above(warn, alarm),
            ThresholdPolicy::Below { warn, alarm } => PolicySpec::below(warn, alarm),
            ThresholdPolicy::OutsideBand { warn, alarm, band } => PolicySpec {
                warn,
                alarm,
                direction: Some("outside_band".to_string()),
                band: Some([band.lo, band.hi]),
                kind: None,
            },
            ThresholdPolicy::Binary { alarm } => {
                PolicySpec::binary(if alarm { 1.0 } else { 0.0 })
            }
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ThresholdFile {
    #[serde(default)]
    tags: BTreeMap<String, PolicySpec>,
}

/// Static tag → policy mapping, loaded once at startup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdTable {
    policies: BTreeMap<String, ThresholdPolicy>,
}

impl ThresholdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thresholds of the main distribution panel hotspots
    pub fn panel_default() -> Self {
        let specs = [
            ("panel.busbar.r.temp_c", PolicySpec::above(70.0, 80.0)),
            ("panel.busbar.y.temp_c", PolicySpec::above(70.0, 80.0)),
            ("panel.busbar.b.temp_c", PolicySpec::above(70.0, 80.0)),
            ("panel.main_feeder.current_a", PolicySpec::above(350.0, 400.0)),
            ("panel.power.factor", PolicySpec::below(0.92, 0.88)),
            ("panel.cooling.fan_rpm", PolicySpec::below(1200.0, 800.0)),
            ("panel.ambient.temp_c", PolicySpec::above(38.0, 45.0)),
            ("panel.ambient.rh_pct", PolicySpec::above(70.0, 80.0)),
            ("panel.safety.smoke", PolicySpec::binary(1.0)),
            ("panel.safety.door_open", PolicySpec::binary(1.0)),
            ("panel.vfd.heatsink_c", PolicySpec::above(70.0, 85.0)),
            ("panel.psu.v_out", PolicySpec::outside_band(23.4, 22.8, 23.8, 24.4)),
            ("panel.plc.link_ok", PolicySpec::binary(0.0)),
        ];

        let mut table = Self::new();
        for (tag, spec) in specs {
            // Built-in specs are well formed
            if let Ok(policy) = spec.into_policy(tag) {
                table.policies.insert(tag.to_string(), policy);
            }
        }
        table
    }

    /// Validate and insert a raw spec
    pub fn insert_spec(&mut self, tag: &str, spec: PolicySpec) -> Result<(), ConfigError> {
        let policy = spec.into_policy(tag)?;
        self.policies.insert(tag.to_string(), policy);
        Ok(())
    }

    pub fn insert(&mut self, tag: impl Into<String>, policy: ThresholdPolicy) {
        self.policies.insert(tag.into(), policy);
    }

    pub fn get(&self, tag: &str) -> Option<&ThresholdPolicy> {
        self.policies.get(tag)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ThresholdPolicy)> {
        self.policies.iter().map(|(tag, policy)| (tag.as_str(), policy))
    }

    /// Ad-hoc classification by tag. Tags without a policy are `NoSignal`.
    pub fn classify(&self, tag: &str, value: Option<SignalValue>) -> AlertLevel {
        match self.policies.get(tag) {
            Some(policy) => classify(value, policy),
            None => AlertLevel::NoSignal,
        }
    }

    /// Parse a `[tags."<tag>"]` TOML document, validating every policy
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    /// Load thresholds from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: origin.clone(), source })?;
        let table = Self::parse(&content, &origin)?;
        tracing::info!("Loaded {} threshold policies from {}", table.len(), origin);
        Ok(table)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let file = ThresholdFile {
            tags: self
                .policies
                .iter()
                .map(|(tag, policy)| (tag.clone(), PolicySpec::from(policy)))
                .collect(),
        };
        Ok(toml::to_string_pretty(&file)?)
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let file: ThresholdFile = toml::from_str(content)
            .map_err(|source| ConfigError::Parse { path: origin.to_string(), source })?;

        let mut table = Self::new();
        for (tag, spec) in file.tags {
            table.insert_spec(&tag, spec)?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_default_has_every_hotspot() {
        let table = ThresholdTable::panel_default();
        assert_eq!(table.len(), 13);
        assert_eq!(
            table.get("panel.psu.v_out"),
            Some(&ThresholdPolicy::OutsideBand {
                warn: Some(23.4),
                alarm: Some(22.8),
                band: Band { lo: 23.8, hi: 24.4 },
            })
        );
        assert_eq!(table.get("panel.plc.link_ok"), Some(&ThresholdPolicy::Binary { alarm: false }));
        assert_eq!(
            table.get("panel.cooling.fan_rpm"),
            Some(&ThresholdPolicy::Below { warn: 1200.0, alarm: 800.0 })
        );
    }

    #[test]
    fn test_classify_by_tag() {
        let table = ThresholdTable::panel_default();
        assert_eq!(
            table.classify("panel.busbar.r.temp_c", Some(SignalValue::Numeric(81.0))),
            AlertLevel::Alarm
        );
        assert_eq!(table.classify("panel.busbar.r.temp_c", None), AlertLevel::NoSignal);
        assert_eq!(
            table.classify("panel.unknown", Some(SignalValue::Numeric(1.0))),
            AlertLevel::NoSignal
        );
    }

    #[test]
    fn test_outside_band_requires_band() {
        let spec = PolicySpec {
            direction: Some("outside_band".to_string()),
            ..PolicySpec::above(1.0, 2.0)
        };
        assert!(matches!(spec.into_policy("x"), Err(ConfigError::MissingBand { .. })));
    }

    #[test]
    fn test_band_must_be_ordered() {
        let spec = PolicySpec::outside_band(0.0, 0.0, 24.4, 23.8);
        assert!(matches!(spec.into_policy("x"), Err(ConfigError::InvalidBand { .. })));

        let spec = PolicySpec::outside_band(0.0, 0.0, 24.0, 24.0);
        assert!(matches!(spec.into_policy("x"), Err(ConfigError::InvalidBand { .. })));
    }

    #[test]
    fn test_band_only_with_outside_band() {
        let spec = PolicySpec { band: Some([1.0, 2.0]), ..PolicySpec::above(1.0, 2.0) };
        assert!(matches!(spec.into_policy("x"), Err(ConfigError::UnexpectedBand { .. })));
    }

    #[test]
    fn test_binary_rejects_numeric_fields() {
        let spec = PolicySpec { warn: Some(0.5), ..PolicySpec::binary(1.0) };
        assert!(matches!(
            spec.into_policy("x"),
            Err(ConfigError::BinaryConflict { field: "warn", .. })
        ));

        let spec = PolicySpec::binary(2.0);
        assert!(matches!(spec.into_policy("x"), Err(ConfigError::InvalidBinaryAlarm { .. })));
    }

    #[test]
    fn test_numeric_policy_requires_both_levels() {
        let spec = PolicySpec { warn: None, ..PolicySpec::above(1.0, 2.0) };
        assert!(matches!(
            spec.into_policy("x"),
            Err(ConfigError::MissingThreshold { field: "warn", .. })
        ));

        let spec = PolicySpec { alarm: Some(f64::NAN), ..PolicySpec::above(1.0, 2.0) };
        assert!(matches!(spec.into_policy("x"), Err(ConfigError::NonFinite { .. })));

        let spec = PolicySpec { direction: Some("sideways".into()), ..PolicySpec::above(1.0, 2.0) };
        assert!(matches!(spec.into_policy("x"), Err(ConfigError::UnknownDirection { .. })));
    }

    #[test]
    fn test_parse_toml_table() {
        let content = r#"
            [tags."panel.busbar.r.temp_c"]
            warn = 70
            alarm = 80

            [tags."panel.psu.v_out"]
            direction = "outside_band"
            band = [23.8, 24.4]

            [tags."panel.safety.smoke"]
            type = "binary"
            alarm = 1
        "#;
        let table = ThresholdTable::from_toml_str(content).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.get("panel.busbar.r.temp_c"),
            Some(&ThresholdPolicy::Above { warn: 70.0, alarm: 80.0 })
        );
        assert_eq!(table.get("panel.safety.smoke"), Some(&ThresholdPolicy::Binary { alarm: true }));
    }

    #[test]
    fn test_malformed_toml_is_fatal() {
        let content = r#"
            [tags."panel.psu.v_out"]
            direction = "outside_band"
        "#;
        assert!(matches!(
            ThresholdTable::from_toml_str(content),
            Err(ConfigError::MissingBand { .. })
        ));
        assert!(matches!(
            ThresholdTable::from_toml_str("tags = 3"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let table = ThresholdTable::panel_default();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, table.to_toml_string().unwrap().as_bytes()).unwrap();

        let loaded = ThresholdTable::from_file(file.path()).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = ThresholdTable::from_file("/nonexistent/thresholds.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/thresholds.toml"));
    }
}
