use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// OHLC accumulator for a scalar quantity (balance, equity or exposure) over one time step.
///
/// A bar is seeded with the previous bar's close and only ever widened by [`Bar::set_close`],
/// so `low <= open, close <= high` holds for its whole lifetime.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    open_time: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl Bar {
    /// Opens a bar at `open_time` with all four prices equal to `seed`.
    pub fn new(open_time: DateTime<Utc>, seed: f64) -> Self {
        Self {
            open_time,
            open: seed,
            high: seed,
            low: seed,
            close: seed,
        }
    }

    /// Returns the open time.
    pub fn open_time(&self) -> DateTime<Utc> {
        self.open_time
    }

    /// Returns the open value.
    pub fn open(&self) -> f64 {
        self.open
    }

    /// Returns the high value.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Returns the low value.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Returns the close value.
    pub fn close(&self) -> f64 {
        self.close
    }

    /// Sets the close and widens high/low to include it. Never narrows them.
    pub fn set_close(&mut self, value: f64) {
        self.close = value;
        self.high = self.high.max(value);
        self.low = self.low.min(value);
    }
}

#[cfg(test)]
#[test]
fn new_bar_is_flat() {
    let bar = Bar::new(DateTime::default(), 1.5);
    assert_eq!(bar.open(), 1.5);
    assert_eq!(bar.high(), 1.5);
    assert_eq!(bar.low(), 1.5);
    assert_eq!(bar.close(), 1.5);
}

#[cfg(test)]
#[test]
fn set_close_widens() {
    let mut bar = Bar::new(DateTime::default(), 10.0);
    bar.set_close(12.0);
    bar.set_close(7.0);
    bar.set_close(9.0);
    assert_eq!(bar.open(), 10.0);
    assert_eq!(bar.high(), 12.0);
    assert_eq!(bar.low(), 7.0);
    assert_eq!(bar.close(), 9.0);
}

