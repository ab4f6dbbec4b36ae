use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::normalization::VolumeNormalizationOptions;

/// Length of one simulated bar.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeFrame {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    #[default]
    H1,
    /// 4 hours
    H4,
    /// 1 day
    D1,
    /// 1 week
    W1,
}

impl TimeFrame {
    /// Returns the duration of one bar.
    pub fn duration(&self) -> Duration {
        match self {
            Self::M1 => Duration::minutes(1),
            Self::M5 => Duration::minutes(5),
            Self::M15 => Duration::minutes(15),
            Self::M30 => Duration::minutes(30),
            Self::H1 => Duration::hours(1),
            Self::H4 => Duration::hours(4),
            Self::D1 => Duration::days(1),
            Self::W1 => Duration::weeks(1),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
            Self::W1 => "1w",
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFrame {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(Self::M1),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "30m" => Ok(Self::M30),
            "1h" => Ok(Self::H1),
            "4h" => Ok(Self::H4),
            "1d" => Ok(Self::D1),
            "1w" => Ok(Self::W1),
            _ => Err(Error::InvalidTimeFrame(s.to_string())),
        }
    }
}

/// How the equity curve is derived.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationMode {
    /// Tick-accurate equity from price data. Not implemented.
    Precise,
    /// Balance plus the time-interpolated profit of every open trade.
    #[default]
    InterpolateEquityFromBalance,
    /// Balance only; no equity bars are produced.
    BalanceOnly,
}

/// Which events are recorded into the result journal.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum JournalLevel {
    /// Nothing.
    #[default]
    Off,
    /// Trade openings and closings.
    Trades,
    /// Trades and every closed bar.
    Bars,
}

/// How chatty the simulator is on the `tracing` side.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Warnings only.
    Quiet,
    /// Run start and stop.
    #[default]
    Normal,
    /// Every trade and every bar.
    Verbose,
}

/// Immutable configuration of a simulation run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOptions {
    time_step: TimeFrame,
    initial_balance: f64,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    mode: SimulationMode,
    track_asset_exposure: bool,
    track_correlation: bool,
    volume_normalization: VolumeNormalizationOptions,
    journal_level: JournalLevel,
    verbosity: Verbosity,
    continue_on_error: bool,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            time_step: TimeFrame::default(),
            initial_balance: 1.0,
            start_time: None,
            end_time: None,
            mode: SimulationMode::default(),
            track_asset_exposure: false,
            track_correlation: false,
            volume_normalization: VolumeNormalizationOptions::default(),
            journal_level: JournalLevel::default(),
            verbosity: Verbosity::default(),
            continue_on_error: false,
        }
    }
}

impl SimulationOptions {
    /// Starts a builder from the defaults.
    pub fn builder() -> SimulationOptionsBuilder {
        SimulationOptionsBuilder::default()
    }

    /// Returns the bar length.
    pub fn time_step(&self) -> TimeFrame {
        self.time_step
    }

    /// Returns the initial balance of the simulated portfolio.
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Returns the explicit start bound.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Returns the explicit end bound.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Returns the equity mode.
    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    /// Returns `true` if per-asset exposure bars are produced.
    pub fn track_asset_exposure(&self) -> bool {
        self.track_asset_exposure
    }

    /// Returns `true` if per-component exposure bars are produced.
    pub fn track_correlation(&self) -> bool {
        self.track_correlation
    }

    /// Returns the normalization options.
    pub fn volume_normalization(&self) -> &VolumeNormalizationOptions {
        &self.volume_normalization
    }

    /// Returns the journal level.
    pub fn journal_level(&self) -> JournalLevel {
        self.journal_level
    }

    /// Returns the verbosity.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Returns `true` if per-trade errors are recorded instead of aborting the run.
    pub fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }
}

/// Builder for [`SimulationOptions`].
///
/// ### Example
/// ```rust
/// use bts_portfolio::prelude::*;
///
/// let options = SimulationOptions::builder()
///     .time_step(TimeFrame::D1)
///     .initial_balance(10_000.0)
///     .mode(SimulationMode::BalanceOnly)
///     .track_asset_exposure(true)
///     .continue_on_error(true)
///     .build()
///     .unwrap();
/// assert_eq!(options.time_step().to_string(), "1d");
/// ```
#[derive(Debug, Default)]
pub struct SimulationOptionsBuilder {
    options: SimulationOptions,
}

impl SimulationOptionsBuilder {
    /// Sets the bar length.
    pub fn time_step(mut self, time_step: TimeFrame) -> Self {
        self.options.time_step = time_step;
        self
    }

    /// Sets the initial balance.
    pub fn initial_balance(mut self, initial_balance: f64) -> Self {
        self.options.initial_balance = initial_balance;
        self
    }

    /// Restricts the run to start no earlier than `start`.
    pub fn start_time(mut self, start: DateTime<Utc>) -> Self {
        self.options.start_time = Some(start);
        self
    }

    /// Restricts the run to end no later than `end`.
    pub fn end_time(mut self, end: DateTime<Utc>) -> Self {
        self.options.end_time = Some(end);
        self
    }

    /// Sets the equity mode.
    pub fn mode(mut self, mode: SimulationMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Enables per-asset exposure bars.
    pub fn track_asset_exposure(mut self, track: bool) -> Self {
        self.options.track_asset_exposure = track;
        self
    }

    /// Enables per-component exposure bars, needed by exposure correlation.
    pub fn track_correlation(mut self, track: bool) -> Self {
        self.options.track_correlation = track;
        self
    }

    /// Sets the normalization options.
    pub fn volume_normalization(mut self, options: VolumeNormalizationOptions) -> Self {
        self.options.volume_normalization = options;
        self
    }

    /// Sets the journal level.
    pub fn journal_level(mut self, level: JournalLevel) -> Self {
        self.options.journal_level = level;
        self
    }

    /// Sets the verbosity.
    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.options.verbosity = verbosity;
        self
    }

    /// Records per-trade errors instead of aborting.
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.options.continue_on_error = continue_on_error;
        self
    }

    /// Builds the options.
    pub fn build(self) -> Result<SimulationOptions> {
        let options = self.options;
        if options.initial_balance <= 0.0 || !options.initial_balance.is_finite() {
            return Err(Error::NegZeroBalance(options.initial_balance));
        }
        if let (Some(start), Some(end)) = (options.start_time, options.end_time)
            && end <= start
        {
            return Err(Error::InvalidTimeWindow { start, end });
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_frame_round_trip() {
        for tf in [TimeFrame::M15, TimeFrame::H4, TimeFrame::W1] {
            assert_eq!(tf.to_string().parse::<TimeFrame>().unwrap(), tf);
        }
        assert_eq!(TimeFrame::D1.duration(), Duration::days(1));
        assert!(matches!("2h".parse::<TimeFrame>(), Err(Error::InvalidTimeFrame(_))));
    }

    #[test]
    fn defaults() {
        let options = SimulationOptions::builder().build().unwrap();
        assert_eq!(options, SimulationOptions::default());
        assert_eq!(options.initial_balance(), 1.0);
        assert_eq!(options.mode(), SimulationMode::InterpolateEquityFromBalance);
        assert!(!options.continue_on_error());
    }

    #[test]
    fn invalid_balance() {
        let result = SimulationOptions::builder().initial_balance(0.0).build();
        assert!(matches!(result, Err(Error::NegZeroBalance(_))));
    }

    #[test]
    fn invalid_window() {
        let start = DateTime::default() + Duration::days(2);
        let result = SimulationOptions::builder()
            .start_time(start)
            .end_time(start - Duration::days(1))
            .build();
        assert!(matches!(result, Err(Error::InvalidTimeWindow { .. })));
    }

    #[test]
    fn journal_levels_are_ordered() {
        assert!(JournalLevel::Bars >= JournalLevel::Trades);
        assert!(Verbosity::Verbose > Verbosity::Normal);
    }
}
