use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::engine::{Bar, TradeSide};
use crate::errors::Error;
use crate::metrics::SimulationStats;

/// Long and short exposure bars of one component.
#[cfg_attr(feature = "serde", derive(Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExposureBars {
    /// Sum of the normalized volumes of open buys, per bar.
    pub long: Vec<Bar>,
    /// Sum of the normalized volumes of open sells, per bar.
    pub short: Vec<Bar>,
}

/// Event recorded into [`SimulationResult::journal`].
#[cfg_attr(feature = "serde", derive(Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    /// A trade joined the open set.
    TradeOpened {
        /// Bar the trade was opened in.
        bar_time: DateTime<Utc>,
        /// Owning component.
        component: String,
        /// Index of the trade in the component.
        trade: usize,
        /// Side of the trade.
        side: TradeSide,
        /// Signed normalized volume.
        volume: f64,
    },

    /// A trade was closed and its profit booked.
    TradeClosed {
        /// Bar the trade was closed in.
        bar_time: DateTime<Utc>,
        /// Owning component.
        component: String,
        /// Index of the trade in the component.
        trade: usize,
        /// Balance change caused by the trade.
        balance_change: f64,
    },

    /// A bar was appended.
    BarClosed {
        /// Open time of the bar.
        bar_time: DateTime<Utc>,
        /// Balance close.
        balance: f64,
        /// Equity close, absent when no equity is produced.
        equity: Option<f64>,
    },
}

/// Output of a simulation run.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub(crate) start: DateTime<Utc>,
    pub(crate) end: DateTime<Utc>,
    pub(crate) initial_balance: f64,
    pub(crate) equity_bars: Vec<Bar>,
    pub(crate) balance_bars: Vec<Bar>,
    pub(crate) asset_exposure_bars: BTreeMap<String, Vec<Bar>>,
    pub(crate) component_exposure_bars: BTreeMap<String, ExposureBars>,
    pub(crate) stats: SimulationStats,
    pub(crate) exceptions: Vec<Error>,
    pub(crate) journal: Vec<JournalEntry>,
}

impl SimulationResult {
    /// Returns the effective start of the run.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the effective end of the run.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns the equity bars. Empty in balance-only mode.
    pub fn equity_bars(&self) -> &[Bar] {
        &self.equity_bars
    }

    /// Returns the balance bars.
    pub fn balance_bars(&self) -> &[Bar] {
        &self.balance_bars
    }

    /// Returns the net exposure bars of each asset.
    pub fn asset_exposure_bars(&self) -> &BTreeMap<String, Vec<Bar>> {
        &self.asset_exposure_bars
    }

    /// Returns the exposure bars of each component, when correlation tracking was on.
    pub fn component_exposure_bars(&self) -> &BTreeMap<String, ExposureBars> {
        &self.component_exposure_bars
    }

    /// Returns the exposure bars of the component `id`.
    pub fn exposure_of(&self, id: &str) -> Option<&ExposureBars> {
        self.component_exposure_bars.get(id)
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Returns the errors recorded while continuing on error.
    pub fn exceptions(&self) -> &[Error] {
        &self.exceptions
    }

    /// Returns the journal.
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// Returns the close of the last balance bar, or the initial balance if there is none.
    pub fn final_balance(&self) -> f64 {
        self.balance_bars.last().map_or(self.initial_balance, Bar::close)
    }

    /// Serializes the result to a JSON string.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
