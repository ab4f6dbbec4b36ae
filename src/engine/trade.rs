use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Represents the side of a trade (buy or sell).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    /// Long.
    Buy,
    /// Short.
    Sell,
}

impl TradeSide {
    /// Returns `1.0` for a buy and `-1.0` for a sell.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

/// A closed trade taken from a component's backtest. The engine only reads it.
///
/// Deserialization goes through [`TradeBuilder`], so it rejects what the builder rejects.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "TradeRecord"))]
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    entry_time: DateTime<Utc>,
    closing_time: DateTime<Utc>,
    side: TradeSide,
    volume: f64,
    entry_price: f64,
    net_profit: f64,
    symbol: Option<String>,
}

impl Trade {
    /// Returns the entry time.
    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    /// Returns the closing time.
    pub fn closing_time(&self) -> DateTime<Utc> {
        self.closing_time
    }

    /// Returns the side.
    pub fn side(&self) -> TradeSide {
        self.side
    }

    /// Returns the volume (always non-negative).
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Returns the volume signed by side.
    pub fn signed_volume(&self) -> f64 {
        self.volume * self.side.sign()
    }

    /// Returns the entry price.
    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    /// Returns the realized profit, fees included.
    pub fn net_profit(&self) -> f64 {
        self.net_profit
    }

    /// Returns the traded symbol, if the trade carries one.
    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }
}

/// Builder for [`Trade`].
///
/// ### Example
/// ```rust
/// use bts_portfolio::prelude::*;
/// use chrono::{DateTime, Duration};
///
/// let trade = TradeBuilder::builder()
///     .entry_time(DateTime::default())
///     .closing_time(DateTime::default() + Duration::hours(4))
///     .side(TradeSide::Sell)
///     .volume(0.5)
///     .entry_price(1.0850)
///     .net_profit(-12.0)
///     .symbol("EURUSD")
///     .build()
///     .unwrap();
/// assert_eq!(trade.signed_volume(), -0.5);
/// ```
#[derive(Debug, Default)]
pub struct TradeBuilder {
    entry_time: Option<DateTime<Utc>>,
    closing_time: Option<DateTime<Utc>>,
    side: Option<TradeSide>,
    volume: Option<f64>,
    entry_price: f64,
    net_profit: f64,
    symbol: Option<String>,
}

impl TradeBuilder {
    /// Starts an empty builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Sets the entry time.
    pub fn entry_time(mut self, entry_time: DateTime<Utc>) -> Self {
        self.entry_time = Some(entry_time);
        self
    }

    /// Sets the closing time.
    pub fn closing_time(mut self, closing_time: DateTime<Utc>) -> Self {
        self.closing_time = Some(closing_time);
        self
    }

    /// Sets the side.
    pub fn side(mut self, side: TradeSide) -> Self {
        self.side = Some(side);
        self
    }

    /// Sets the volume.
    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Sets the entry price.
    pub fn entry_price(mut self, entry_price: f64) -> Self {
        self.entry_price = entry_price;
        self
    }

    /// Sets the net profit.
    pub fn net_profit(mut self, net_profit: f64) -> Self {
        self.net_profit = net_profit;
        self
    }

    /// Sets the symbol.
    pub fn symbol(mut self, symbol: impl ToString) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    /// Builds the trade.
    pub fn build(self) -> Result<Trade> {
        let volume = self.volume.ok_or(Error::MissingField("volume"))?;
        if !volume.is_finite() || volume < 0.0 {
            return Err(Error::InvalidVolume(volume));
        }
        for (field, value) in [("entry_price", self.entry_price), ("net_profit", self.net_profit)] {
            if !value.is_finite() {
                return Err(Error::NonFiniteValue { field, value });
            }
        }

        let entry_time = self.entry_time.ok_or(Error::MissingField("entry_time"))?;
        let closing_time = self.closing_time.ok_or(Error::MissingField("closing_time"))?;
        if closing_time < entry_time {
            return Err(Error::InvalidTimeWindow {
                start: entry_time,
                end: closing_time,
            });
        }

        Ok(Trade {
            entry_time,
            closing_time,
            side: self.side.ok_or(Error::MissingField("side"))?,
            volume,
            entry_price: self.entry_price,
            net_profit: self.net_profit,
            symbol: self.symbol,
        })
    }
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct TradeRecord {
    entry_time: DateTime<Utc>,
    closing_time: DateTime<Utc>,
    side: TradeSide,
    volume: f64,
    #[serde(default)]
    entry_price: f64,
    #[serde(default)]
    net_profit: f64,
    #[serde(default)]
    symbol: Option<String>,
}

#[cfg(feature = "serde")]
impl TryFrom<TradeRecord> for Trade {
    type Error = Error;

    fn try_from(record: TradeRecord) -> Result<Self> {
        let builder = TradeBuilder::builder()
            .entry_time(record.entry_time)
            .closing_time(record.closing_time)
            .side(record.side)
            .volume(record.volume)
            .entry_price(record.entry_price)
            .net_profit(record.net_profit);
        match record.symbol {
            Some(symbol) => builder.symbol(symbol).build(),
            None => builder.build(),
        }
    }
}
