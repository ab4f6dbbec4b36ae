use chrono::{DateTime, Utc};

use crate::engine::SimulationMode;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building inputs, running a simulation or correlating components.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The portfolio has no components. A simulation requires at least one.
    #[error("Portfolio is empty: simulation requires at least one component")]
    EmptyPortfolio,

    /// Two components share the same id.
    #[error("Duplicate component id: {0}")]
    DuplicateComponent(String),

    /// The effective simulation window is empty.
    #[error("Invalid time window: end {end} is not after start {start}")]
    InvalidTimeWindow {
        /// Effective start.
        start: DateTime<Utc>,
        /// Effective end.
        end: DateTime<Utc>,
    },

    /// The requested simulation mode has no implementation.
    #[error("Simulation mode {0:?} is not implemented")]
    UnimplementedMode(SimulationMode),

    /// A trade symbol cannot be split into a long and a short asset.
    #[error("Unresolved asset pair for component {component}: {symbol:?}")]
    UnresolvedAssetPair {
        /// Component owning the trade.
        component: String,
        /// Offending symbol.
        symbol: String,
    },

    /// Exposure bar series of both components have different lengths.
    #[error("Mismatched bar count: {0} vs {1}")]
    MismatchedBarCount(usize, usize),

    /// No exposure bars were recorded for the component.
    #[error("No exposure bars for component {0}: run the simulation with correlation tracking")]
    MissingExposureBars(String),

    /// A balance is zero or negative.
    #[error("Balance must be positive (got: {0})")]
    NegZeroBalance(f64),

    /// A trade volume is negative or not finite.
    #[error("Volume must be finite and non-negative (got: {0})")]
    InvalidVolume(f64),

    /// A price or profit is NaN or infinite.
    #[error("{field} must be finite (got: {value})")]
    NonFiniteValue {
        /// Offending field.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// A builder was finalized without a required field.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The normalization multiplier of a component was read before being computed.
    #[error("Component {0} is not prepared: compute its normalization multiplier first")]
    UnpreparedComponent(String),

    /// The simulator was driven out of order.
    #[error("Invalid simulator state: {0}")]
    InvalidState(&'static str),

    /// The caller cancelled the run.
    #[error("Simulation cancelled after {completed_bars} bars")]
    Cancelled {
        /// Bars fully closed before the cancellation was observed.
        completed_bars: usize,
    },

    /// The time frame string cannot be parsed.
    #[error("Invalid time frame: {0}")]
    InvalidTimeFrame(String),
}
