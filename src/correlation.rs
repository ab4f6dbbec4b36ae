//! Pairwise comparison of components.
//!
//! [`Correlation::analyze`] merges the trades of two components into one timeline and measures
//! how long they spend long, short, flat or against each other, plus a difference score over
//! their net normalized volumes. [`Correlation::with_exposure`] adds the exposure-bar scores
//! of a simulation run made with correlation tracking.

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::RatioCalculus;
use crate::engine::{Component, ExposureBars, SimulationResult};
use crate::errors::{Error, Result};
use crate::normalization::{VolumeNormalizationOptions, normalize_volume};
use crate::utils::{millis_between, snap_flat};

/// Category of a stretch of time, given the net volumes of both components.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeBucket {
    /// Both net long.
    BothLong,
    /// Both net short.
    BothShort,
    /// Both flat.
    BothFlat,
    /// One net long, the other net short.
    OppositeDirection,
    /// Exactly one of them has a position.
    OneOpen,
    /// Non-zero nets that cancel each other out. Overlaps the other buckets.
    OffsettingNonZero,
}

/// Time spent in each [`TimeBucket`], in milliseconds.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeInMarket {
    both_long_ms: i64,
    both_short_ms: i64,
    both_flat_ms: i64,
    opposite_direction_ms: i64,
    one_open_ms: i64,
    offsetting_non_zero_ms: i64,
    total_ms: i64,
}

impl TimeInMarket {
    /// Returns the time spent in `bucket`.
    pub fn get(&self, bucket: TimeBucket) -> i64 {
        match bucket {
            TimeBucket::BothLong => self.both_long_ms,
            TimeBucket::BothShort => self.both_short_ms,
            TimeBucket::BothFlat => self.both_flat_ms,
            TimeBucket::OppositeDirection => self.opposite_direction_ms,
            TimeBucket::OneOpen => self.one_open_ms,
            TimeBucket::OffsettingNonZero => self.offsetting_non_zero_ms,
        }
    }

    /// Returns the share of the timeline spent in `bucket`, `0.0` for an empty timeline.
    pub fn fraction(&self, bucket: TimeBucket) -> f64 {
        (self.get(bucket) as f64).ratio_or(self.total_ms as f64, 0.0)
    }

    /// Returns the length of the timeline, from the first event to the last.
    pub fn total_ms(&self) -> i64 {
        self.total_ms
    }

    fn add(&mut self, bucket: TimeBucket, elapsed_ms: i64) {
        let slot = match bucket {
            TimeBucket::BothLong => &mut self.both_long_ms,
            TimeBucket::BothShort => &mut self.both_short_ms,
            TimeBucket::BothFlat => &mut self.both_flat_ms,
            TimeBucket::OppositeDirection => &mut self.opposite_direction_ms,
            TimeBucket::OneOpen => &mut self.one_open_ms,
            TimeBucket::OffsettingNonZero => &mut self.offsetting_non_zero_ms,
        };
        *slot += elapsed_ms;
    }
}

/// Classifies a pair of net volumes into its exclusive bucket.
fn bucket_of(first: f64, second: f64) -> TimeBucket {
    if first > 0.0 && second > 0.0 {
        TimeBucket::BothLong
    } else if first < 0.0 && second < 0.0 {
        TimeBucket::BothShort
    } else if first == 0.0 && second == 0.0 {
        TimeBucket::BothFlat
    } else if first * second < 0.0 {
        TimeBucket::OppositeDirection
    } else {
        TimeBucket::OneOpen
    }
}

#[derive(Debug, Clone, Copy)]
struct Leg {
    time: DateTime<Utc>,
    // 0 for the first component, 1 for the second
    owner: usize,
    volume: f64,
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Open(Leg),
    Close(Leg),
}

impl Event {
    fn leg(&self) -> &Leg {
        match self {
            Self::Open(leg) | Self::Close(leg) => leg,
        }
    }

    // opens sort before closes at equal timestamps
    fn sort_key(&self) -> (DateTime<Utc>, u8) {
        match self {
            Self::Open(leg) => (leg.time, 0),
            Self::Close(leg) => (leg.time, 1),
        }
    }
}

/// Comparison of two components.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    first: String,
    second: String,
    same_symbol: bool,
    time_in_market: TimeInMarket,
    difference_score: f64,
    high_score: Option<f64>,
    low_score: Option<f64>,
}

impl Correlation {
    /// Compares the trade timelines of two prepared components.
    ///
    /// ### Errors
    /// `UnpreparedComponent` if a normalization multiplier is missing
    /// (see [`crate::engine::Portfolio::prepare`]).
    pub fn analyze(first: &Component, second: &Component, options: &VolumeNormalizationOptions) -> Result<Self> {
        let mut events = Vec::with_capacity(2 * (first.trades().len() + second.trades().len()));
        for (owner, component) in [first, second].into_iter().enumerate() {
            for trade in component.trades() {
                let volume = normalize_volume(trade, component, options)?;
                events.push(Event::Open(Leg {
                    time: trade.entry_time(),
                    owner,
                    volume,
                }));
                events.push(Event::Close(Leg {
                    time: trade.closing_time(),
                    owner,
                    volume,
                }));
            }
        }
        events.sort_by_key(Event::sort_key);

        let mut nets = [0.0_f64; 2];
        let mut time_in_market = TimeInMarket::default();
        let mut weighted_squares = 0.0_f64;
        let mut previous: Option<DateTime<Utc>> = None;

        for event in &events {
            let leg = event.leg();
            if let Some(previous) = previous {
                let elapsed = millis_between(previous, leg.time);
                if elapsed > 0 {
                    let [a, b] = nets;
                    time_in_market.add(bucket_of(a, b), elapsed);
                    if a != 0.0 && snap_flat(a + b) == 0.0 {
                        time_in_market.add(TimeBucket::OffsettingNonZero, elapsed);
                    }
                    time_in_market.total_ms += elapsed;
                    weighted_squares += elapsed as f64 * (b - a).powi(2);
                }
            }

            let net = &mut nets[leg.owner];
            *net = match event {
                Event::Open(leg) => snap_flat(*net + leg.volume),
                Event::Close(leg) => snap_flat(*net - leg.volume),
            };
            previous = Some(leg.time);
        }

        let difference_score = weighted_squares.ratio_or(time_in_market.total_ms as f64, 0.0).sqrt();

        Ok(Self {
            first: first.id().to_string(),
            second: second.id().to_string(),
            same_symbol: first.symbol().is_some() && first.symbol() == second.symbol(),
            time_in_market,
            difference_score,
            high_score: None,
            low_score: None,
        })
    }

    /// Adds the exposure-bar scores from a run made with correlation tracking.
    ///
    /// ### Errors
    /// `MissingExposureBars` if the run did not track one of the components,
    /// `MismatchedBarCount` if their series differ in length.
    pub fn with_exposure(mut self, result: &SimulationResult) -> Result<Self> {
        let first = result
            .exposure_of(&self.first)
            .ok_or_else(|| Error::MissingExposureBars(self.first.clone()))?;
        let second = result
            .exposure_of(&self.second)
            .ok_or_else(|| Error::MissingExposureBars(self.second.clone()))?;

        let (high, low) = exposure_scores(first, second)?;
        self.high_score = Some(high);
        self.low_score = Some(low);
        Ok(self)
    }

    /// Returns the id of the first component.
    pub fn first(&self) -> &str {
        &self.first
    }

    /// Returns the id of the second component.
    pub fn second(&self) -> &str {
        &self.second
    }

    /// Returns `true` if both components trade the same symbol.
    pub fn same_symbol(&self) -> bool {
        self.same_symbol
    }

    /// Returns the time-in-market buckets.
    pub fn time_in_market(&self) -> &TimeInMarket {
        &self.time_in_market
    }

    /// Returns the time-weighted RMS difference of the net volumes.
    pub fn difference_score(&self) -> f64 {
        self.difference_score
    }

    /// Returns the mean absolute difference of the long-exposure highs.
    pub fn high_score(&self) -> Option<f64> {
        self.high_score
    }

    /// Returns the mean absolute difference of the long-exposure lows.
    pub fn low_score(&self) -> Option<f64> {
        self.low_score
    }
}

/// Mean absolute difference of the highs and of the lows of two long-exposure series.
pub fn exposure_scores(first: &ExposureBars, second: &ExposureBars) -> Result<(f64, f64)> {
    if first.long.len() != second.long.len() {
        return Err(Error::MismatchedBarCount(first.long.len(), second.long.len()));
    }

    let count = first.long.len() as f64;
    let (high, low) = first
        .long
        .iter()
        .zip(&second.long)
        .fold((0.0_f64, 0.0_f64), |(high, low), (a, b)| {
            (high + (a.high() - b.high()).abs(), low + (a.low() - b.low()).abs())
        });

    Ok((high.ratio_or(count, 0.0), low.ratio_or(count, 0.0)))
}
