use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, trace, warn};

use crate::RatioCalculus;
use crate::engine::{
    Bar, ExposureBars, JournalEntry, JournalLevel, Portfolio, SimulationMode, SimulationOptions, SimulationResult,
    TradeSide, Verbosity,
};
use crate::errors::{Error, Result};
use crate::metrics::{DrawdownTracker, SimulationStats};
use crate::normalization::normalize_volume;
use crate::utils::{millis_between, snap_flat};

/// Lifecycle of a [`Simulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    /// Created or reset; `start()` is the only valid call.
    NotStarted,
    /// Bars are being stepped.
    Running,
    /// The run was stopped or cancelled; `reset()` to run again.
    Stopped,
}

/// How equity bars are derived, resolved once from [`SimulationMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EquityModel {
    Interpolated,
    BalanceOnly,
}

impl EquityModel {
    fn from_mode(mode: SimulationMode) -> Result<Self> {
        match mode {
            SimulationMode::Precise => Err(Error::UnimplementedMode(mode)),
            SimulationMode::InterpolateEquityFromBalance => Ok(Self::Interpolated),
            SimulationMode::BalanceOnly => Ok(Self::BalanceOnly),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TradeKey {
    component: usize,
    trade: usize,
}

/// Asset deltas applied at entry and reverted at exit.
#[derive(Debug, Clone)]
struct Legs {
    base: String,
    base_delta: f64,
    quote: String,
    quote_delta: f64,
}

/// A trade taking part in the run, with everything the loop needs precomputed.
#[derive(Debug, Clone)]
struct ScheduledTrade {
    key: TradeKey,
    entry_time: DateTime<Utc>,
    closing_time: DateTime<Utc>,
    side: TradeSide,
    normalized: f64,
    balance_change: f64,
    legs: Option<Legs>,
}

impl ScheduledTrade {
    /// Elapsed fraction of the trade at `time`, clamped to `[0, 1]`.
    fn progress(&self, time: DateTime<Utc>) -> f64 {
        let total = millis_between(self.entry_time, self.closing_time);
        if total <= 0 {
            return 1.0;
        }
        (millis_between(self.entry_time, time) as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// Bars of the current time step, appended when the next step opens.
#[derive(Debug, Clone)]
struct OpenBars {
    balance: Bar,
    equity: Option<Bar>,
    assets: BTreeMap<String, Bar>,
    components: Vec<(Bar, Bar)>,
}

/// State of a running simulation.
#[derive(Debug)]
struct Run {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
    next_open: DateTime<Utc>,
    model: EquityModel,
    initial_balance: f64,
    verbosity: Verbosity,
    journal_level: JournalLevel,
    track_correlation: bool,
    component_ids: Vec<String>,
    // sorted by entry time
    schedule: Vec<ScheduledTrade>,
    // indices into `schedule`, sorted by closing time
    exits: Vec<usize>,
    next_entry: usize,
    next_exit: usize,
    // schedule index -> exposure applied
    open: BTreeMap<usize, bool>,
    balance: f64,
    asset_levels: BTreeMap<String, f64>,
    component_levels: Vec<(f64, f64)>,
    bars: Option<OpenBars>,
    equity_bars: Vec<Bar>,
    balance_bars: Vec<Bar>,
    asset_bars: BTreeMap<String, Vec<Bar>>,
    component_bars: Vec<ExposureBars>,
    equity_drawdown: DrawdownTracker,
    balance_drawdown: DrawdownTracker,
    exceptions: Vec<Error>,
    journal: Vec<JournalEntry>,
}

impl Run {
    fn new(
        portfolio: &Portfolio,
        options: &SimulationOptions,
        model: EquityModel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self> {
        let initial_balance = options.initial_balance();
        let mut schedule = Vec::new();
        let mut exceptions = Vec::new();
        let mut asset_levels = BTreeMap::new();

        for (c, component) in portfolio.components().enumerate() {
            for (t, trade) in component.trades().enumerate() {
                // closed before the window, or opened after it
                if trade.closing_time() < start || trade.entry_time() > end {
                    continue;
                }

                let legs = if options.track_asset_exposure() {
                    match component.resolve_assets(trade) {
                        Ok(pair) => Some(Legs {
                            base: pair.base().to_string(),
                            base_delta: trade.signed_volume(),
                            quote: pair.quote().to_string(),
                            quote_delta: -trade.signed_volume() * trade.entry_price(),
                        }),
                        Err(error) if options.continue_on_error() => {
                            warn!(%error, component = component.id(), trade = t, "Trade skipped from asset exposure");
                            exceptions.push(error);
                            None
                        }
                        Err(error) => return Err(error),
                    }
                } else {
                    None
                };

                if let Some(legs) = &legs {
                    asset_levels.entry(legs.base.clone()).or_insert(0.0);
                    asset_levels.entry(legs.quote.clone()).or_insert(0.0);
                }

                let balance_change = trade.net_profit().ratio_or(component.initial_balance(), 0.0) * initial_balance;
                schedule.push(ScheduledTrade {
                    key: TradeKey { component: c, trade: t },
                    entry_time: trade.entry_time(),
                    closing_time: trade.closing_time(),
                    side: trade.side(),
                    normalized: normalize_volume(trade, component, options.volume_normalization())?,
                    balance_change,
                    legs,
                });
            }
        }

        schedule.sort_by_key(|trade| (trade.entry_time, trade.key));
        let mut exits: Vec<usize> = (0..schedule.len()).collect();
        exits.sort_by_key(|&i| (schedule[i].closing_time, schedule[i].key));

        let component_ids: Vec<String> = portfolio.components().map(|c| c.id().to_string()).collect();
        let tracked = if options.track_correlation() { component_ids.len() } else { 0 };

        Ok(Self {
            start,
            end,
            step: options.time_step().duration(),
            next_open: start,
            model,
            initial_balance,
            verbosity: options.verbosity(),
            journal_level: options.journal_level(),
            track_correlation: options.track_correlation(),
            component_ids,
            schedule,
            exits,
            next_entry: 0,
            next_exit: 0,
            open: BTreeMap::new(),
            balance: initial_balance,
            asset_bars: asset_levels.keys().map(|asset| (asset.clone(), Vec::new())).collect(),
            asset_levels,
            component_levels: vec![(0.0, 0.0); tracked],
            bars: None,
            equity_bars: Vec::new(),
            balance_bars: Vec::new(),
            component_bars: vec![ExposureBars::default(); tracked],
            equity_drawdown: DrawdownTracker::new(initial_balance),
            balance_drawdown: DrawdownTracker::new(initial_balance),
            exceptions,
            journal: Vec::new(),
        })
    }

    fn is_done(&self) -> bool {
        self.next_open >= self.end
    }

    fn completed_bars(&self) -> usize {
        self.balance_bars.len()
    }

    /// Closes the current bar, opens the next one and plays every event inside it.
    fn advance(&mut self) {
        self.flush();

        let open_time = self.next_open;
        let bar_end = (open_time + self.step).min(self.end);
        let inclusive = bar_end == self.end;
        let within = |time: DateTime<Utc>| time < bar_end || (inclusive && time == bar_end);
        self.next_open = bar_end;
        self.open_bars(open_time);

        while self.next_entry < self.schedule.len() && within(self.schedule[self.next_entry].entry_time) {
            let index = self.next_entry;
            self.next_entry += 1;
            let same_bar = within(self.schedule[index].closing_time);
            self.enter(index, same_bar, open_time);
        }

        while self.next_exit < self.exits.len() && within(self.schedule[self.exits[self.next_exit]].closing_time) {
            let index = self.exits[self.next_exit];
            self.next_exit += 1;
            self.exit(index, open_time);
        }

        if self.model == EquityModel::Interpolated {
            let floating: f64 = self
                .open
                .keys()
                .map(|&i| self.schedule[i].balance_change * self.schedule[i].progress(bar_end))
                .sum();
            let equity = self.balance + floating;
            if let Some(bar) = self.bars.as_mut().and_then(|bars| bars.equity.as_mut()) {
                bar.set_close(equity);
            }
        }
    }

    fn open_bars(&mut self, open_time: DateTime<Utc>) {
        let equity = match self.model {
            EquityModel::Interpolated => {
                let seed = self.equity_bars.last().map_or(self.initial_balance, Bar::close);
                Some(Bar::new(open_time, seed))
            }
            EquityModel::BalanceOnly => None,
        };

        self.bars = Some(OpenBars {
            balance: Bar::new(open_time, self.balance),
            equity,
            assets: self
                .asset_levels
                .iter()
                .map(|(asset, level)| (asset.clone(), Bar::new(open_time, *level)))
                .collect(),
            components: self
                .component_levels
                .iter()
                .map(|(long, short)| (Bar::new(open_time, *long), Bar::new(open_time, *short)))
                .collect(),
        });
    }

    fn enter(&mut self, index: usize, same_bar: bool, bar_time: DateTime<Utc>) {
        let exposed = !same_bar;
        if exposed {
            self.apply_exposure(index, 1.0);
        }
        self.open.insert(index, exposed);

        let trade = &self.schedule[index];
        let component = &self.component_ids[trade.key.component];
        if self.verbosity >= Verbosity::Verbose {
            debug!(
                component = component.as_str(),
                trade = trade.key.trade,
                side = ?trade.side,
                volume = trade.normalized,
                same_bar,
                "Trade opened"
            );
        }
        if self.journal_level >= JournalLevel::Trades {
            self.journal.push(JournalEntry::TradeOpened {
                bar_time,
                component: component.clone(),
                trade: trade.key.trade,
                side: trade.side,
                volume: trade.normalized,
            });
        }
    }

    fn exit(&mut self, index: usize, bar_time: DateTime<Utc>) {
        if self.open.remove(&index).unwrap_or(false) {
            self.apply_exposure(index, -1.0);
        }

        let trade = &self.schedule[index];
        self.balance += trade.balance_change;
        if let Some(bars) = self.bars.as_mut() {
            bars.balance.set_close(self.balance);
        }

        let component = &self.component_ids[trade.key.component];
        if self.verbosity >= Verbosity::Verbose {
            debug!(
                component = component.as_str(),
                trade = trade.key.trade,
                balance_change = trade.balance_change,
                balance = self.balance,
                "Trade closed"
            );
        }
        if self.journal_level >= JournalLevel::Trades {
            self.journal.push(JournalEntry::TradeClosed {
                bar_time,
                component: component.clone(),
                trade: trade.key.trade,
                balance_change: trade.balance_change,
            });
        }
    }

    /// Adds (`direction = 1.0`) or removes (`-1.0`) the exposure of a scheduled trade.
    fn apply_exposure(&mut self, index: usize, direction: f64) {
        let trade = &self.schedule[index];
        let Some(bars) = self.bars.as_mut() else {
            return;
        };

        let c = trade.key.component;
        if let (Some((long, short)), Some((long_bar, short_bar))) =
            (self.component_levels.get_mut(c), bars.components.get_mut(c))
        {
            let (level, bar) = match trade.side {
                TradeSide::Buy => (long, long_bar),
                TradeSide::Sell => (short, short_bar),
            };
            *level = snap_flat(*level + direction * trade.normalized.abs());
            bar.set_close(*level);
        }

        if let Some(legs) = &trade.legs {
            for (asset, delta) in [(&legs.base, legs.base_delta), (&legs.quote, legs.quote_delta)] {
                if let Some(level) = self.asset_levels.get_mut(asset) {
                    *level = snap_flat(*level + direction * delta);
                    if let Some(bar) = bars.assets.get_mut(asset) {
                        bar.set_close(*level);
                    }
                }
            }
        }
    }

    /// Appends the open bars and feeds the drawdown trackers.
    fn flush(&mut self) {
        let Some(bars) = self.bars.take() else {
            return;
        };

        let balance = bars.balance.close();
        self.balance_drawdown.update(balance);
        let equity = bars.equity.map(|bar| bar.close());
        match bars.equity {
            Some(bar) => {
                self.equity_drawdown.update(bar.close());
                self.equity_bars.push(bar);
            }
            // no equity curve: equity statistics follow the balance
            None => self.equity_drawdown.update(balance),
        }
        self.balance_bars.push(bars.balance);

        for (asset, bar) in bars.assets {
            self.asset_bars.entry(asset).or_default().push(bar);
        }
        for (series, (long, short)) in self.component_bars.iter_mut().zip(bars.components) {
            series.long.push(long);
            series.short.push(short);
        }

        let bar_time = bars.balance.open_time();
        if self.verbosity >= Verbosity::Verbose {
            trace!(%bar_time, balance, equity = ?equity, "Bar closed");
        }
        if self.journal_level >= JournalLevel::Bars {
            self.journal.push(JournalEntry::BarClosed {
                bar_time,
                balance,
                equity,
            });
        }
    }

    fn finish(mut self) -> SimulationResult {
        self.flush();

        let final_balance = self.balance_bars.last().map_or(self.initial_balance, Bar::close);
        let stats = SimulationStats::new(
            &self.equity_drawdown,
            &self.balance_drawdown,
            self.initial_balance,
            final_balance,
            self.start,
            self.end,
        );

        let component_exposure_bars = if self.track_correlation {
            self.component_ids.into_iter().zip(self.component_bars).collect()
        } else {
            BTreeMap::new()
        };

        SimulationResult {
            start: self.start,
            end: self.end,
            initial_balance: self.initial_balance,
            equity_bars: self.equity_bars,
            balance_bars: self.balance_bars,
            asset_exposure_bars: self.asset_bars,
            component_exposure_bars,
            stats,
            exceptions: self.exceptions,
            journal: self.journal,
        }
    }
}

/// Bar-stepping engine replaying the trades of a [`Portfolio`].
///
/// Drive it with [`Simulator::simulate`], or step by step with [`Simulator::start`],
/// [`Simulator::step`] and [`Simulator::stop`]. A bar is appended when the next one opens;
/// `stop()` appends the last one.
///
/// ### Example
/// ```rust
/// use bts_portfolio::prelude::*;
/// use chrono::{DateTime, Duration};
///
/// let component = ComponentBuilder::builder()
///     .id("idle")
///     .initial_balance(100.0)
///     .backtest_start(DateTime::default())
///     .backtest_end(DateTime::default() + Duration::hours(3))
///     .build()
///     .unwrap();
/// let portfolio = Portfolio::new(vec![component]).unwrap();
///
/// let mut simulator = Simulator::new(portfolio, SimulationOptions::default());
/// simulator.start().unwrap();
/// while simulator.step().unwrap() {}
/// let result = simulator.stop().unwrap();
/// assert_eq!(result.balance_bars().len(), 3);
/// assert_eq!(simulator.state(), SimulatorState::Stopped);
/// ```
#[derive(Debug)]
pub struct Simulator {
    portfolio: Portfolio,
    options: SimulationOptions,
    cancel: Option<Arc<AtomicBool>>,
    state: SimulatorState,
    run: Option<Run>,
}

impl Simulator {
    /// Creates a simulator owning `portfolio`.
    pub fn new(portfolio: Portfolio, options: SimulationOptions) -> Self {
        Self {
            portfolio,
            options,
            cancel: None,
            state: SimulatorState::NotStarted,
            run: None,
        }
    }

    /// Attaches a cancellation flag, checked once per bar.
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> SimulatorState {
        self.state
    }

    /// Returns the portfolio.
    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Returns the options.
    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    /// Consumes the simulator and returns its portfolio.
    pub fn into_portfolio(self) -> Portfolio {
        self.portfolio
    }

    /// Validates the inputs and prepares a run. No bar is produced yet.
    ///
    /// ### Errors
    /// `EmptyPortfolio`, `UnimplementedMode`, `InvalidTimeWindow`, and `UnresolvedAssetPair`
    /// when asset tracking is on without `continue_on_error`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SimulatorState::NotStarted {
            return Err(Error::InvalidState("start() requires a fresh or reset simulator"));
        }
        if self.portfolio.is_empty() {
            return Err(Error::EmptyPortfolio);
        }

        let model = EquityModel::from_mode(self.options.mode())?;
        let (start, end) = self.window()?;
        self.portfolio.prepare(self.options.volume_normalization());
        let run = Run::new(&self.portfolio, &self.options, model, start, end)?;

        if self.options.verbosity() >= Verbosity::Normal {
            info!(
                components = self.portfolio.len(),
                trades = run.schedule.len(),
                %start,
                %end,
                time_step = %self.options.time_step(),
                mode = ?self.options.mode(),
                "Simulation started"
            );
        }

        self.run = Some(run);
        self.state = SimulatorState::Running;
        Ok(())
    }

    /// Plays the next bar. Returns `false` once the window is exhausted.
    ///
    /// ### Errors
    /// `InvalidState` outside of a run, `Cancelled` when the cancellation flag is set. A
    /// cancelled run is discarded with its open bar.
    pub fn step(&mut self) -> Result<bool> {
        let Some(run) = self.run.as_mut() else {
            return Err(Error::InvalidState("step() requires a running simulator"));
        };
        if run.is_done() {
            return Ok(false);
        }

        if let Some(cancel) = &self.cancel
            && cancel.load(Ordering::Relaxed)
        {
            let completed_bars = run.completed_bars();
            if self.options.verbosity() >= Verbosity::Normal {
                info!(completed_bars, "Simulation cancelled");
            }
            self.run = None;
            self.state = SimulatorState::Stopped;
            return Err(Error::Cancelled { completed_bars });
        }

        run.advance();
        Ok(true)
    }

    /// Appends the last bar, computes the statistics and returns the result.
    pub fn stop(&mut self) -> Result<SimulationResult> {
        let run = self
            .run
            .take()
            .ok_or(Error::InvalidState("stop() requires a running simulator"))?;
        self.state = SimulatorState::Stopped;

        let result = run.finish();
        if self.options.verbosity() >= Verbosity::Normal {
            info!(
                bars = result.balance_bars().len(),
                final_balance = result.final_balance(),
                profit_pct = result.stats().profit_pct(),
                exceptions = result.exceptions().len(),
                "Simulation stopped"
            );
        }
        Ok(result)
    }

    /// Runs the whole window: `start()`, `step()` until done, `stop()`.
    pub fn simulate(&mut self) -> Result<SimulationResult> {
        self.start()?;
        while self.step()? {}
        self.stop()
    }

    /// Drops any run in progress and returns to [`SimulatorState::NotStarted`].
    pub fn reset(&mut self) {
        self.run = None;
        self.state = SimulatorState::NotStarted;
    }

    /// Portfolio range narrowed by the explicit option bounds.
    fn window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let (Some(first), Some(last)) = (self.portfolio.start(), self.portfolio.end()) else {
            return Err(Error::EmptyPortfolio);
        };
        let start = self.options.start_time().map_or(first, |bound| bound.max(first));
        let end = self.options.end_time().map_or(last, |bound| bound.min(last));
        if end <= start {
            return Err(Error::InvalidTimeWindow { start, end });
        }
        Ok((start, end))
    }
}
