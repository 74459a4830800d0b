//! Error types for the telemetry engine

use thiserror::Error;

use crate::registry::SubscriberId;

/// Top-level errors surfaced by the telemetry engine
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Subscriber error: {0}")]
    Subscriber(#[from] SubscriberError),
}

/// Load-time configuration errors. Always fatal to startup, never raised per tick.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Policy for {tag} uses outside_band but has no band")]
    MissingBand { tag: String },

    #[error("Policy for {tag} has band [{lo}, {hi}] but the lower bound must be below the upper bound")]
    InvalidBand { tag: String, lo: f64, hi: f64 },

    #[error("Policy for {tag} declares a band but direction is not outside_band")]
    UnexpectedBand { tag: String },

    #[error("Policy for {tag} is missing the {field} threshold")]
    MissingThreshold { tag: String, field: &'static str },

    #[error("Binary policy for {tag} must not declare {field}")]
    BinaryConflict { tag: String, field: &'static str },

    #[error("Binary policy for {tag} has alarm value {value}, expected 0 or 1")]
    InvalidBinaryAlarm { tag: String, value: f64 },

    #[error("Policy for {tag} has a non-finite {field} value")]
    NonFinite { tag: String, field: &'static str },

    #[error("Unknown direction {direction:?} for {tag}")]
    UnknownDirection { tag: String, direction: String },

    #[error("Unknown policy type {kind:?} for {tag}")]
    UnknownPolicyType { tag: String, kind: String },

    #[error("State weights must be non-negative and sum to 1.0, got sum {sum}")]
    InvalidStateWeights { sum: f64 },

    #[error("Ideal cycle time range [{min}, {max}] must be positive and ordered")]
    InvalidCycleTimeRange { min: f64, max: f64 },

    #[error("Invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A fault raised by a subscriber callback during fan-out
#[derive(Error, Debug)]
pub enum SubscriberError {
    #[error("Subscriber {id} returned an error on tick {tick}: {message}")]
    Failed { id: SubscriberId, tick: u64, message: String },

    #[error("Subscriber {id} panicked on tick {tick}: {message}")]
    Panicked { id: SubscriberId, tick: u64, message: String },
}
