//! # BTS Portfolio: rebuild and compare backtested strategies
//!
//! **BTS Portfolio** takes a set of independently backtested strategies ("components"), each with
//! its own closed trades, and replays them together on a fixed time grid. It rebuilds the equity
//! and balance curves of the combined portfolio, tracks drawdowns, and measures how similarly two
//! components behave.
//!
//! The engine is a pure function of its inputs: it never fetches prices, places orders, draws
//! charts or writes files.
//!
//! ## Core Components
//! | Component       | Description                                                                  |
//! |-----------------|------------------------------------------------------------------------------|
//! | **`Bar`**       | OHLC accumulator of balance, equity or exposure over one time step.          |
//! | **`Trade`**     | A closed trade of a component: entry/close time, side, volume, net profit.   |
//! | **`Component`** | One backtested strategy: metadata, trades, volume extremes, assets.         |
//! | **`Portfolio`** | Ordered components with unique ids and a derived time range.                 |
//! | **`Simulator`** | The bar-stepping engine.                                                     |
//! | **`SimulationResult`** | Bars, exposure bars, statistics, journal and recorded errors.         |
//! | **`Correlation`** | Time-in-market buckets and divergence scores of two components.          |
//!
//! ## Simulation Modes
//! | Mode                               | Description                                                   |
//! |------------------------------------|---------------------------------------------------------------|
//! | **InterpolateEquityFromBalance**   | Equity = balance + time-interpolated profit of open trades.   |
//! | **BalanceOnly**                    | Balance steps at each close, no equity bars.                  |
//! | **Precise**                        | Tick-accurate equity. Not implemented, rejected at start.     |
//!
//! ## Statistics
//! | Metric            | Description                                                            |
//! |-------------------|------------------------------------------------------------------------|
//! | **Max Drawdown**  | Largest decline from the running peak, absolute and as a fraction.     |
//! | **AD / ABD**      | Annualized return over max equity / balance drawdown.                  |
//! | **RD**            | Return over max equity drawdown.                                       |
//! | **AAD**           | Annualized return over average equity drawdown.                        |
//!
//! ## Getting Started
//! ```rust
//! use bts_portfolio::prelude::*;
//! use chrono::{DateTime, Duration};
//!
//! let start = DateTime::default();
//! let trade = TradeBuilder::builder()
//!     .entry_time(start + Duration::hours(1))
//!     .closing_time(start + Duration::hours(5))
//!     .side(TradeSide::Buy)
//!     .volume(1.0)
//!     .net_profit(100.0)
//!     .symbol("EURUSD")
//!     .build()
//!     .unwrap();
//!
//! let component = ComponentBuilder::builder()
//!     .id("trend")
//!     .initial_balance(1_000.0)
//!     .backtest_start(start)
//!     .backtest_end(start + Duration::days(1))
//!     .trade(trade)
//!     .build()
//!     .unwrap();
//!
//! let portfolio = Portfolio::new(vec![component]).unwrap();
//! let options = SimulationOptions::builder()
//!     .time_step(TimeFrame::H1)
//!     .initial_balance(1.0)
//!     .build()
//!     .unwrap();
//!
//! let result = Simulator::new(portfolio, options).simulate().unwrap();
//! assert!((result.final_balance() - 1.1).abs() < 1e-12);
//! ```
//!
//! ## Features
//! | Feature      | Description                                                               |
//! |--------------|---------------------------------------------------------------------------|
//! | `serde`      | Serialize inputs and results, `SimulationResult::to_json`.                |
//! | `parallel`   | Run independent simulations on a [`rayon`](https://crates.io/crates/rayon) pool. |
//!
//! ## Logging
//! The engine emits [`tracing`](https://crates.io/crates/tracing) events and never installs a
//! subscriber. Install one in the application to see them.
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Simulation engine: bars, trades, components, portfolio, options and the simulator.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Drawdown tracking and summary statistics.
pub mod metrics;

/// Volume normalization.
pub mod normalization;

/// Pairwise comparison of components.
pub mod correlation;

/// Parallel execution of independent simulations.
#[cfg(feature = "parallel")]
pub mod batch;

/// Utility functions and helpers.
mod utils;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::correlation::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::metrics::*;
    pub use crate::normalization::*;

    #[cfg(feature = "parallel")]
    pub use crate::batch::*;
}

use std::ops::{Div, Sub};

/// Trait for guarded ratio calculations.
///
/// Every method returns a defined value, never `NaN`, when the denominator is zero.
pub trait RatioCalculus<Rhs = Self> {
    /// Divides by `rhs`.
    ///
    /// ### Arguments
    /// * `rhs` - The denominator.
    /// * `fallback` - Returned when `rhs` is zero or not finite.
    fn ratio_or(self, rhs: Rhs, fallback: Self) -> Self;

    /// Calculates the relative change between two values (`0.1` for +10%).
    ///
    /// ### Arguments
    /// * `new` - The new value to compare with.
    ///
    /// ### Returns
    /// `0.0` when the original value is zero.
    fn change(self, new: Self) -> Self;

    /// Divides a return by a drawdown.
    ///
    /// ### Returns
    /// `+∞` for a positive return without drawdown, `0.0` for a flat or negative one.
    fn over_drawdown(self, drawdown: Rhs) -> Self;
}

impl RatioCalculus for f64 {
    fn ratio_or(self, rhs: Self, fallback: Self) -> Self {
        if rhs == 0.0 || !rhs.is_finite() {
            return fallback;
        }
        self.div(rhs)
    }

    fn change(self, new: Self) -> Self {
        new.sub(self).ratio_or(self, 0.0)
    }

    fn over_drawdown(self, drawdown: Self) -> Self {
        let fallback = if self > 0.0 { f64::INFINITY } else { 0.0 };
        self.ratio_or(drawdown, fallback)
    }
}
