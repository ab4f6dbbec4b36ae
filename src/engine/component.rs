use std::sync::OnceLock;

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::Trade;
use crate::errors::{Error, Result};
use crate::normalization::{VolumeNormalizationOptions, compute_multiplier};

/// Default weight of a component.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// The two legs of a traded symbol.
///
/// A buy is long the base and short the quote, a sell is the reverse.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetPair {
    base: String,
    quote: String,
}

impl AssetPair {
    /// Splits a symbol into base and quote.
    ///
    /// `BTC/USDT`, `BTC-USDT`, `BTC_USDT` and `ES.USD` split on the separator; a bare six-letter
    /// symbol such as `EURUSD` splits in the middle. Anything else is unresolved.
    pub fn resolve(symbol: &str) -> Option<Self> {
        let symbol = symbol.trim();
        if let Some((base, quote)) = symbol.split_once(['/', '-', '_', '.']) {
            if base.is_empty() || quote.is_empty() {
                return None;
            }
            return Some(Self {
                base: base.to_uppercase(),
                quote: quote.to_uppercase(),
            });
        }

        if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_alphabetic()) {
            let (base, quote) = symbol.split_at(3);
            return Some(Self {
                base: base.to_uppercase(),
                quote: quote.to_uppercase(),
            });
        }

        None
    }

    /// Returns the base asset.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns the quote asset.
    pub fn quote(&self) -> &str {
        &self.quote
    }
}

/// Smallest and largest absolute trade volume of a component.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeRange {
    /// Smallest absolute volume.
    pub min: f64,
    /// Largest absolute volume.
    pub max: f64,
}

impl VolumeRange {
    fn of(trades: &[Trade]) -> Self {
        let mut volumes = trades.iter().map(|t| t.volume().abs());
        match volumes.next() {
            Some(first) => {
                let (min, max) = volumes.fold((first, first), |(min, max), v| (min.min(v), max.max(v)));
                Self { min, max }
            }
            None => Self { min: 0.0, max: 0.0 },
        }
    }
}

/// One independently backtested strategy and its trades.
///
/// Deserialization goes through [`ComponentBuilder`]; a stored normalization multiplier is
/// dropped and recomputed by [`Component::prepare`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "ComponentRecord"))]
#[derive(Debug, Clone)]
pub struct Component {
    id: String,
    weight: f64,
    symbol: Option<String>,
    assets: Option<AssetPair>,
    backtest_start: DateTime<Utc>,
    backtest_end: DateTime<Utc>,
    initial_balance: f64,
    min_allowed_trade_volume: f64,
    trades: Vec<Trade>,
    #[cfg_attr(feature = "serde", serde(skip))]
    volume_range: OnceLock<VolumeRange>,
    normalization_multiplier: Option<f64>,
}

impl Component {
    /// Returns the id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the weight.
    ///
    /// The weight is carried for callers but is not applied to the simulated balance.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Returns the symbol, `None` for a multi-symbol component.
    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    /// Returns the long asset of a buy on the component symbol.
    pub fn long_asset(&self) -> Option<&str> {
        self.assets.as_ref().map(AssetPair::base)
    }

    /// Returns the short asset of a buy on the component symbol.
    pub fn short_asset(&self) -> Option<&str> {
        self.assets.as_ref().map(AssetPair::quote)
    }

    /// Returns the backtest start.
    pub fn backtest_start(&self) -> DateTime<Utc> {
        self.backtest_start
    }

    /// Returns the backtest end.
    pub fn backtest_end(&self) -> DateTime<Utc> {
        self.backtest_end
    }

    /// Returns the backtest initial balance.
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Returns the broker's minimum allowed trade volume for the component symbol.
    pub fn min_allowed_trade_volume(&self) -> f64 {
        self.min_allowed_trade_volume
    }

    /// Returns an iterator over the trades.
    pub fn trades(&self) -> std::slice::Iter<'_, Trade> {
        self.trades.iter()
    }

    /// Returns the trade at `index`.
    pub fn trade(&self, index: usize) -> Option<&Trade> {
        self.trades.get(index)
    }

    /// Returns the memoized volume extremes. `0.0/0.0` when there are no trades.
    pub fn volume_range(&self) -> VolumeRange {
        *self.volume_range.get_or_init(|| VolumeRange::of(&self.trades))
    }

    /// Returns the smallest absolute trade volume.
    pub fn min_abs_volume(&self) -> f64 {
        self.volume_range().min
    }

    /// Returns the largest absolute trade volume.
    pub fn max_abs_volume(&self) -> f64 {
        self.volume_range().max
    }

    /// Returns the normalization multiplier, once [`Component::prepare`] ran.
    pub fn normalization_multiplier(&self) -> Option<f64> {
        self.normalization_multiplier
    }

    /// Computes and stores the normalization multiplier.
    pub fn prepare(&mut self, options: &VolumeNormalizationOptions) -> f64 {
        let multiplier = compute_multiplier(self, self.min_allowed_trade_volume, options);
        self.normalization_multiplier = Some(multiplier);
        multiplier
    }

    /// Resolves the asset pair of `trade`: its own symbol first, then the component symbol.
    pub fn resolve_assets(&self, trade: &Trade) -> Result<AssetPair> {
        let unresolved = |symbol: &str| Error::UnresolvedAssetPair {
            component: self.id.clone(),
            symbol: symbol.to_string(),
        };

        match (trade.symbol(), &self.assets) {
            (Some(symbol), _) => AssetPair::resolve(symbol).ok_or_else(|| unresolved(symbol)),
            (None, Some(assets)) => Ok(assets.clone()),
            (None, None) => Err(unresolved(self.symbol().unwrap_or_default())),
        }
    }
}

/// Builder for [`Component`].
///
/// The backtest range defaults to the span of the trades when not set.
#[derive(Debug, Default)]
pub struct ComponentBuilder {
    id: Option<String>,
    weight: Option<f64>,
    symbol: Option<String>,
    backtest_start: Option<DateTime<Utc>>,
    backtest_end: Option<DateTime<Utc>>,
    initial_balance: Option<f64>,
    min_allowed_trade_volume: Option<f64>,
    trades: Vec<Trade>,
}

impl ComponentBuilder {
    /// Starts an empty builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Sets the id.
    pub fn id(mut self, id: impl ToString) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Sets the weight.
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Sets the symbol of a single-symbol component.
    pub fn symbol(mut self, symbol: impl ToString) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    /// Sets the backtest start.
    pub fn backtest_start(mut self, start: DateTime<Utc>) -> Self {
        self.backtest_start = Some(start);
        self
    }

    /// Sets the backtest end.
    pub fn backtest_end(mut self, end: DateTime<Utc>) -> Self {
        self.backtest_end = Some(end);
        self
    }

    /// Sets the backtest initial balance.
    pub fn initial_balance(mut self, initial_balance: f64) -> Self {
        self.initial_balance = Some(initial_balance);
        self
    }

    /// Sets the minimum allowed trade volume (defaults to `1.0`).
    pub fn min_allowed_trade_volume(mut self, volume: f64) -> Self {
        self.min_allowed_trade_volume = Some(volume);
        self
    }

    /// Appends a trade.
    pub fn trade(mut self, trade: Trade) -> Self {
        self.trades.push(trade);
        self
    }

    /// Appends trades.
    pub fn trades(mut self, trades: impl IntoIterator<Item = Trade>) -> Self {
        self.trades.extend(trades);
        self
    }

    /// Builds the component.
    pub fn build(self) -> Result<Component> {
        let id = self.id.ok_or(Error::MissingField("id"))?;
        let initial_balance = self.initial_balance.ok_or(Error::MissingField("initial_balance"))?;
        if initial_balance <= 0.0 || !initial_balance.is_finite() {
            return Err(Error::NegZeroBalance(initial_balance));
        }

        let backtest_start = self
            .backtest_start
            .or_else(|| self.trades.iter().map(Trade::entry_time).min())
            .ok_or(Error::MissingField("backtest_start"))?;
        let backtest_end = self
            .backtest_end
            .or_else(|| self.trades.iter().map(Trade::closing_time).max())
            .ok_or(Error::MissingField("backtest_end"))?;
        if backtest_end < backtest_start {
            return Err(Error::InvalidTimeWindow {
                start: backtest_start,
                end: backtest_end,
            });
        }

        let min_allowed_trade_volume = self.min_allowed_trade_volume.unwrap_or(1.0);
        if !min_allowed_trade_volume.is_finite() || min_allowed_trade_volume < 0.0 {
            return Err(Error::InvalidVolume(min_allowed_trade_volume));
        }

        let assets = self.symbol.as_deref().and_then(AssetPair::resolve);

        Ok(Component {
            id,
            weight: self.weight.unwrap_or(DEFAULT_WEIGHT),
            symbol: self.symbol,
            assets,
            backtest_start,
            backtest_end,
            initial_balance,
            min_allowed_trade_volume,
            trades: self.trades,
            volume_range: OnceLock::new(),
            normalization_multiplier: None,
        })
    }
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct ComponentRecord {
    id: String,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    backtest_start: Option<DateTime<Utc>>,
    #[serde(default)]
    backtest_end: Option<DateTime<Utc>>,
    initial_balance: f64,
    #[serde(default)]
    min_allowed_trade_volume: Option<f64>,
    #[serde(default)]
    trades: Vec<Trade>,
}

#[cfg(feature = "serde")]
impl TryFrom<ComponentRecord> for Component {
    type Error = Error;

    fn try_from(record: ComponentRecord) -> Result<Self> {
        let mut builder = ComponentBuilder::builder()
            .id(record.id)
            .initial_balance(record.initial_balance)
            .trades(record.trades);
        if let Some(weight) = record.weight {
            builder = builder.weight(weight);
        }
        if let Some(symbol) = record.symbol {
            builder = builder.symbol(symbol);
        }
        if let Some(start) = record.backtest_start {
            builder = builder.backtest_start(start);
        }
        if let Some(end) = record.backtest_end {
            builder = builder.backtest_end(end);
        }
        if let Some(volume) = record.min_allowed_trade_volume {
            builder = builder.min_allowed_trade_volume(volume);
        }
        builder.build()
    }
}
