//! Drawdown tracking and summary statistics.
//!
//! A [`DrawdownTracker`] follows one curve (equity or balance) bar by bar. Once a run stops,
//! both trackers are folded into [`SimulationStats`] together with the profit of the run.

use std::fmt;

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::RatioCalculus;
use crate::utils::years_between;

/// Running high-water mark and drawdown maxima of a curve.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownTracker {
    peak: f64,
    max_drawdown: f64,
    max_drawdown_pct: f64,
    drawdown_pct_sum: f64,
    samples: usize,
}

impl DrawdownTracker {
    /// Starts tracking with `initial` as the first peak.
    pub fn new(initial: f64) -> Self {
        Self {
            peak: initial,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            drawdown_pct_sum: 0.0,
            samples: 0,
        }
    }

    /// Feeds the close of a bar.
    pub fn update(&mut self, close: f64) {
        self.samples += 1;
        if close > self.peak {
            self.peak = close;
            return;
        }

        let drawdown = self.peak - close;
        let drawdown_pct = drawdown.ratio_or(self.peak, 0.0);
        self.drawdown_pct_sum += drawdown_pct;
        self.max_drawdown = self.max_drawdown.max(drawdown);
        self.max_drawdown_pct = self.max_drawdown_pct.max(drawdown_pct);
    }

    /// Returns the high-water mark.
    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Returns the largest absolute drawdown seen so far.
    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    /// Returns the largest drawdown as a fraction of its peak.
    pub fn max_drawdown_pct(&self) -> f64 {
        self.max_drawdown_pct
    }

    /// Returns the mean drawdown fraction over every update (zero at a peak).
    pub fn average_drawdown_pct(&self) -> f64 {
        self.drawdown_pct_sum.ratio_or(self.samples as f64, 0.0)
    }
}

/// Summary statistics of a run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimulationStats {
    max_equity_drawdown: f64,
    max_equity_drawdown_pct: f64,
    max_balance_drawdown: f64,
    max_balance_drawdown_pct: f64,
    profit_pct: f64,
    ad: f64,
    abd: f64,
    rd: f64,
    aad: f64,
}

impl SimulationStats {
    /// Folds both drawdown trackers and the final balance of a run.
    ///
    /// ### Arguments
    /// * `equity` - Tracker of the equity curve (or the balance curve when no equity is produced).
    /// * `balance` - Tracker of the balance curve.
    /// * `initial_balance` - Balance at `start`.
    /// * `final_balance` - Close of the last balance bar.
    /// * `start` / `end` - Window of the run, used to annualize the return.
    pub fn new(
        equity: &DrawdownTracker,
        balance: &DrawdownTracker,
        initial_balance: f64,
        final_balance: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let profit_pct = initial_balance.change(final_balance);
        let annualized = profit_pct.ratio_or(years_between(start, end), 0.0);

        Self {
            max_equity_drawdown: equity.max_drawdown(),
            max_equity_drawdown_pct: equity.max_drawdown_pct(),
            max_balance_drawdown: balance.max_drawdown(),
            max_balance_drawdown_pct: balance.max_drawdown_pct(),
            profit_pct,
            ad: annualized.over_drawdown(equity.max_drawdown_pct()),
            abd: annualized.over_drawdown(balance.max_drawdown_pct()),
            rd: profit_pct.over_drawdown(equity.max_drawdown_pct()),
            aad: annualized.over_drawdown(equity.average_drawdown_pct()),
        }
    }

    /// Returns the largest equity drawdown.
    pub fn max_equity_drawdown(&self) -> f64 {
        self.max_equity_drawdown
    }

    /// Returns the largest equity drawdown as a fraction of its peak.
    pub fn max_equity_drawdown_pct(&self) -> f64 {
        self.max_equity_drawdown_pct
    }

    /// Returns the largest balance drawdown.
    pub fn max_balance_drawdown(&self) -> f64 {
        self.max_balance_drawdown
    }

    /// Returns the largest balance drawdown as a fraction of its peak.
    pub fn max_balance_drawdown_pct(&self) -> f64 {
        self.max_balance_drawdown_pct
    }

    /// Returns the return of the run as a fraction of the initial balance.
    pub fn profit_pct(&self) -> f64 {
        self.profit_pct
    }

    /// Annualized return over max equity drawdown.
    pub fn ad(&self) -> f64 {
        self.ad
    }

    /// Annualized return over max balance drawdown.
    pub fn abd(&self) -> f64 {
        self.abd
    }

    /// Return over max equity drawdown.
    pub fn rd(&self) -> f64 {
        self.rd
    }

    /// Annualized return over average equity drawdown.
    pub fn aad(&self) -> f64 {
        self.aad
    }
}

impl fmt::Display for SimulationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Stats ===")?;
        writeln!(f, "Profit: {:.2}%", self.profit_pct * 100.0)?;
        writeln!(
            f,
            "Max Equity Drawdown: {:.4} ({:.2}%)",
            self.max_equity_drawdown,
            self.max_equity_drawdown_pct * 100.0
        )?;
        writeln!(
            f,
            "Max Balance Drawdown: {:.4} ({:.2}%)",
            self.max_balance_drawdown,
            self.max_balance_drawdown_pct * 100.0
        )?;
        #[allow(clippy::writeln_empty_string)]
        writeln!(f, "")?;
        writeln!(f, "AD: {:.2}", self.ad)?;
        writeln!(f, "ABD: {:.2}", self.abd)?;
        writeln!(f, "RD: {:.2}", self.rd)?;
        writeln!(f, "AAD: {:.2}", self.aad)
    }
}

#[cfg(test)]
fn tracker(closes: &[f64]) -> DrawdownTracker {
    let mut tracker = DrawdownTracker::new(closes[0]);
    for &close in &closes[1..] {
        tracker.update(close);
    }
    tracker
}

#[cfg(test)]
#[test]
fn max_drawdown() {
    let tracker = tracker(&[10000.0, 12000.0, 9000.0, 11000.0]);
    assert_eq!(tracker.peak(), 12000.0);
    assert_eq!(tracker.max_drawdown(), 3000.0);
    assert_eq!(tracker.max_drawdown_pct(), 0.25); // (12000 - 9000) / 12000
}

#[cfg(test)]
#[test]
fn max_drawdown_no_updates() {
    let tracker = DrawdownTracker::new(10000.0);
    assert_eq!(tracker.max_drawdown(), 0.0);
    assert_eq!(tracker.average_drawdown_pct(), 0.0);
}

#[cfg(test)]
#[test]
fn average_drawdown() {
    // peaks count as zero drawdown
    let tracker = tracker(&[100.0, 100.0, 90.0, 110.0, 99.0]);
    assert!((tracker.average_drawdown_pct() - (0.0 + 0.1 + 0.0 + 0.1) / 4.0).abs() < 1e-12);
}

#[cfg(test)]
#[test]
fn stats_ratios() {
    use chrono::Duration;

    let start = DateTime::default();
    let end = start + Duration::milliseconds((365.25 * 86_400_000.0) as i64);
    let equity = tracker(&[100.0, 90.0, 120.0]);
    let balance = tracker(&[100.0, 95.0, 120.0]);
    let stats = SimulationStats::new(&equity, &balance, 100.0, 120.0, start, end);

    assert!((stats.profit_pct() - 0.2).abs() < 1e-12);
    assert!((stats.max_equity_drawdown_pct() - 0.1).abs() < 1e-12);
    assert!((stats.ad() - 2.0).abs() < 1e-9);
    assert!((stats.abd() - 4.0).abs() < 1e-9);
    assert!((stats.rd() - 2.0).abs() < 1e-9);
    assert!(stats.aad() > stats.ad());
}

#[cfg(test)]
#[test]
fn stats_without_drawdown() {
    use chrono::Duration;

    let start = DateTime::default();
    let flat = DrawdownTracker::new(100.0);
    let stats = SimulationStats::new(&flat, &flat, 100.0, 110.0, start, start + Duration::days(30));
    assert_eq!(stats.ad(), f64::INFINITY);
    assert_eq!(stats.rd(), f64::INFINITY);

    let stats = SimulationStats::new(&flat, &flat, 100.0, 100.0, start, start + Duration::days(30));
    assert_eq!(stats.ad(), 0.0);
    assert!(!stats.aad().is_nan());
}

#[cfg(test)]
#[test]
fn display() {
    let flat = DrawdownTracker::new(1.0);
    let stats = SimulationStats::new(&flat, &flat, 1.0, 1.1, DateTime::default(), DateTime::default());
    let text = stats.to_string();
    assert!(text.starts_with("=== Simulation Stats ==="));
    assert!(text.contains("Profit: 10.00%"));
}
