//! Volume normalization.
//!
//! Components are sized very differently: one strategy trades `0.01` lots, another `50`
//! contracts. Before their exposures can be compared, each trade volume goes through a
//! reduction step (a per-component multiplier, see [`compute_multiplier`]) and an optional
//! curve that bounds it to `[0, max]` (see [`normalize_volume`]).

use std::ops::BitOr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::{Component, Trade};
use crate::errors::{Error, Result};

/// Default exponent of the easing curves.
pub const DEFAULT_EASING_EXPONENT: f64 = 2.0;

/// Bit flags selecting how raw volumes are reduced before the curve.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReductionMode(u8);

impl ReductionMode {
    /// No reduction.
    pub const NONE: Self = Self(0);
    /// Divide by the broker's minimum allowed trade volume.
    pub const DIVIDE_BY_MIN_ALLOWED_TRADE_VOLUME: Self = Self(1);
    /// Rescale so the component's smallest trade maps to the minimum allowed trade volume.
    pub const DIVIDE_BY_MINIMUMS_MULTIPLE_OF_MIN_ALLOWED_TRADE_SIZE: Self = Self(1 << 1);

    /// Returns `true` if every flag of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ReductionMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Upper bound applied to normalized volumes.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxMode {
    /// Keep the reduced volume as is.
    #[default]
    None,
    /// Map the reduced volume into `[0, max]` with a curve.
    ToConstant,
}

/// Curve used by [`MaxMode::ToConstant`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Curve {
    /// Pass the trade volume through untouched.
    #[default]
    Linear,
    /// `max` at or above the threshold, `0` below.
    Step,
    /// `max * x^e`.
    EaseIn,
    /// `max * (1 - (1 - x)^e)`.
    EaseOut,
}

/// Configuration of the normalization pipeline.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeNormalizationOptions {
    reduction_mode: ReductionMode,
    max_source_value: Option<f64>,
    max_mode: MaxMode,
    max: f64,
    curve: Curve,
    step_threshold: f64,
    easing_exponent: f64,
}

impl Default for VolumeNormalizationOptions {
    fn default() -> Self {
        Self {
            reduction_mode: ReductionMode::NONE,
            max_source_value: None,
            max_mode: MaxMode::None,
            max: 1.0,
            curve: Curve::Linear,
            step_threshold: 0.5,
            easing_exponent: DEFAULT_EASING_EXPONENT,
        }
    }
}

impl VolumeNormalizationOptions {
    /// Sets the reduction flags.
    pub fn reduction_mode(mut self, mode: ReductionMode) -> Self {
        self.reduction_mode = mode;
        self
    }

    /// Caps the reduced volume before the curve.
    pub fn max_source_value(mut self, value: f64) -> Self {
        self.max_source_value = Some(value);
        self
    }

    /// Sets the max mode.
    pub fn max_mode(mut self, mode: MaxMode) -> Self {
        self.max_mode = mode;
        self
    }

    /// Sets the upper bound used by [`MaxMode::ToConstant`].
    pub fn max(mut self, max: f64) -> Self {
        self.max = max;
        self
    }

    /// Sets the curve.
    pub fn curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self
    }

    /// Sets the step threshold.
    pub fn step_threshold(mut self, threshold: f64) -> Self {
        self.step_threshold = threshold;
        self
    }

    /// Sets the easing exponent.
    pub fn easing_exponent(mut self, exponent: f64) -> Self {
        self.easing_exponent = exponent;
        self
    }

    fn exponent(&self) -> f64 {
        if self.easing_exponent > 0.0 && self.easing_exponent.is_finite() {
            self.easing_exponent
        } else {
            DEFAULT_EASING_EXPONENT
        }
    }
}

/// Computes the volume multiplier of `component`.
///
/// Starts at `1.0`. With [`ReductionMode::DIVIDE_BY_MINIMUMS_MULTIPLE_OF_MIN_ALLOWED_TRADE_SIZE`]
/// and a smallest trade above `min_allowed_trade_volume`, it scales by
/// `min_allowed_trade_volume / min_abs_volume`. With
/// [`ReductionMode::DIVIDE_BY_MIN_ALLOWED_TRADE_VOLUME`] it then divides by
/// `min_allowed_trade_volume`. A minimum that is not positive leaves the multiplier untouched.
pub fn compute_multiplier(
    component: &Component,
    min_allowed_trade_volume: f64,
    options: &VolumeNormalizationOptions,
) -> f64 {
    let mode = options.reduction_mode;
    let mut multiplier = 1.0_f64;

    if mode.contains(ReductionMode::DIVIDE_BY_MINIMUMS_MULTIPLE_OF_MIN_ALLOWED_TRADE_SIZE)
        && min_allowed_trade_volume > 0.0
        && component.min_abs_volume() > min_allowed_trade_volume
    {
        multiplier *= min_allowed_trade_volume / component.min_abs_volume();
    }

    if mode.contains(ReductionMode::DIVIDE_BY_MIN_ALLOWED_TRADE_VOLUME) && min_allowed_trade_volume > 0.0 {
        multiplier /= min_allowed_trade_volume;
    }

    multiplier
}

/// Normalizes the volume of `trade`, signed by side (sells are negative).
///
/// The component must be prepared (see [`Component::prepare`]).
pub fn normalize_volume(trade: &Trade, component: &Component, options: &VolumeNormalizationOptions) -> Result<f64> {
    let multiplier = component
        .normalization_multiplier()
        .ok_or_else(|| Error::UnpreparedComponent(component.id().to_string()))?;
    Ok(scale(trade.volume(), multiplier, options) * trade.side().sign())
}

/// Unsigned normalized volume.
fn scale(volume: f64, multiplier: f64, options: &VolumeNormalizationOptions) -> f64 {
    let mut raw = volume * multiplier;
    if let Some(cap) = options.max_source_value {
        raw = raw.min(cap);
    }

    match options.max_mode {
        MaxMode::None => raw,
        MaxMode::ToConstant => {
            let max = options.max;
            // zero or broken bound: no normalization
            if max <= 0.0 || !max.is_finite() {
                return raw;
            }

            let x = (raw / max).clamp(0.0, 1.0);
            match options.curve {
                Curve::Linear => volume,
                Curve::Step => {
                    if raw >= options.step_threshold {
                        max
                    } else {
                        0.0
                    }
                }
                Curve::EaseIn => max * x.powf(options.exponent()),
                Curve::EaseOut => max * (1.0 - (1.0 - x).powf(options.exponent())),
            }
        }
    }
}
