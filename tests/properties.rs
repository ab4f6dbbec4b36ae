//! Property tests for simulation invariants.
//!
//! Uses proptest to verify:
//! 1. Drawdown maxima never decrease
//! 2. Every produced bar keeps `low <= open, close <= high`
//! 3. Balance-only runs book exactly the profit of the trades closing in the window
//! 4. Bounded curves never exceed `max`
//! 5. The difference score is symmetric

use bts_portfolio::prelude::*;
use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

const WINDOW_MINUTES: i64 = 24 * 60;

fn at(minutes: i64) -> DateTime<Utc> {
    DateTime::default() + Duration::minutes(minutes)
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_side() -> impl Strategy<Value = TradeSide> {
    prop_oneof![Just(TradeSide::Buy), Just(TradeSide::Sell)]
}

fn arb_trade() -> impl Strategy<Value = Trade> {
    (
        -120..WINDOW_MINUTES,
        0..600_i64,
        arb_side(),
        0.01..10.0_f64,
        -200.0..200.0_f64,
        0.5..2.0_f64,
    )
        .prop_map(|(entry, duration, side, volume, net_profit, price)| {
            TradeBuilder::builder()
                .entry_time(at(entry))
                .closing_time(at(entry + duration))
                .side(side)
                .volume(volume)
                .entry_price(price)
                .net_profit(net_profit)
                .build()
                .unwrap()
        })
}

fn arb_component(id: &'static str) -> impl Strategy<Value = Component> {
    prop::collection::vec(arb_trade(), 0..8).prop_map(move |trades| {
        ComponentBuilder::builder()
            .id(id)
            .symbol("EURUSD")
            .initial_balance(1_000.0)
            .backtest_start(at(0))
            .backtest_end(at(WINDOW_MINUTES))
            .trades(trades)
            .build()
            .unwrap()
    })
}

fn arb_portfolio() -> impl Strategy<Value = Portfolio> {
    (arb_component("a"), arb_component("b"), arb_component("c"))
        .prop_map(|(a, b, c)| Portfolio::new(vec![a, b, c]).unwrap())
}

fn arb_time_frame() -> impl Strategy<Value = TimeFrame> {
    prop_oneof![Just(TimeFrame::M30), Just(TimeFrame::H1), Just(TimeFrame::H4)]
}

fn holds_invariant(bar: &Bar) -> bool {
    bar.low() <= bar.open() && bar.low() <= bar.close() && bar.open() <= bar.high() && bar.close() <= bar.high()
}

proptest! {
    /// Max drawdown and its percentage only ever grow.
    #[test]
    fn drawdown_is_monotonic(closes in prop::collection::vec(0.1..10.0_f64, 1..64)) {
        let mut tracker = DrawdownTracker::new(1.0);
        let mut previous = (0.0, 0.0);
        for close in closes {
            tracker.update(close);
            prop_assert!(tracker.max_drawdown() >= previous.0);
            prop_assert!(tracker.max_drawdown_pct() >= previous.1);
            previous = (tracker.max_drawdown(), tracker.max_drawdown_pct());
        }
    }

    /// Every series of every run holds the bar invariant.
    #[test]
    fn bars_hold_invariant(portfolio in arb_portfolio(), time_frame in arb_time_frame()) {
        let options = SimulationOptions::builder()
            .time_step(time_frame)
            .track_asset_exposure(true)
            .track_correlation(true)
            .build()
            .unwrap();
        let result = Simulator::new(portfolio, options).simulate().unwrap();

        prop_assert!(result.balance_bars().iter().all(holds_invariant));
        prop_assert!(result.equity_bars().iter().all(holds_invariant));
        for bars in result.asset_exposure_bars().values() {
            prop_assert!(bars.iter().all(holds_invariant));
        }
        for exposure in result.component_exposure_bars().values() {
            prop_assert!(exposure.long.iter().all(holds_invariant));
            prop_assert!(exposure.short.iter().all(holds_invariant));
            prop_assert!(exposure.long.iter().all(|bar| bar.low() >= 0.0));
        }
    }

    /// Balance-only runs book the profit of every trade closing in the window, scaled.
    #[test]
    fn balance_is_conserved(portfolio in arb_portfolio(), initial_balance in 0.5..100.0_f64) {
        let expected = initial_balance
            + portfolio
                .components()
                .flat_map(|component| component.trades().map(move |trade| (component, trade)))
                .filter(|(_, trade)| trade.closing_time() >= at(0) && trade.closing_time() <= at(WINDOW_MINUTES))
                .map(|(component, trade)| trade.net_profit() / component.initial_balance() * initial_balance)
                .sum::<f64>();

        let options = SimulationOptions::builder()
            .mode(SimulationMode::BalanceOnly)
            .initial_balance(initial_balance)
            .build()
            .unwrap();
        let result = Simulator::new(portfolio, options).simulate().unwrap();
        prop_assert!((result.final_balance() - expected).abs() < 1e-9);
    }

    /// Step and easing curves stay within `[-max, max]`.
    #[test]
    fn bounded_curves(
        volume in 0.0..50.0_f64,
        max in 0.1..5.0_f64,
        side in arb_side(),
        curve in prop_oneof![Just(Curve::Step), Just(Curve::EaseIn), Just(Curve::EaseOut)],
        exponent in 0.5..4.0_f64,
    ) {
        let options = VolumeNormalizationOptions::default()
            .max_mode(MaxMode::ToConstant)
            .max(max)
            .curve(curve)
            .easing_exponent(exponent);
        let trade = TradeBuilder::builder()
            .entry_time(at(0))
            .closing_time(at(60))
            .side(side)
            .volume(volume)
            .build()
            .unwrap();
        let mut component = ComponentBuilder::builder()
            .id("a")
            .initial_balance(1_000.0)
            .trade(trade.clone())
            .build()
            .unwrap();
        component.prepare(&options);

        let normalized = normalize_volume(&trade, &component, &options).unwrap();
        prop_assert!(normalized.abs() <= max + 1e-12);
    }

    /// Linear passes volumes through, so it stays bounded when the volume is.
    #[test]
    fn bounded_linear(max in 0.1..5.0_f64, share in 0.0..1.0_f64, side in arb_side()) {
        let options = VolumeNormalizationOptions::default().max_mode(MaxMode::ToConstant).max(max);
        let trade = TradeBuilder::builder()
            .entry_time(at(0))
            .closing_time(at(60))
            .side(side)
            .volume(max * share)
            .build()
            .unwrap();
        let mut component = ComponentBuilder::builder()
            .id("a")
            .initial_balance(1_000.0)
            .trade(trade.clone())
            .build()
            .unwrap();
        component.prepare(&options);

        prop_assert!(normalize_volume(&trade, &component, &options).unwrap().abs() <= max);
    }

    /// Swapping the components changes neither the score nor the buckets.
    #[test]
    fn difference_score_is_symmetric(a in arb_component("a"), b in arb_component("b")) {
        let options = VolumeNormalizationOptions::default();
        let mut portfolio = Portfolio::new(vec![a, b]).unwrap();
        portfolio.prepare(&options);
        let a = portfolio.component("a").unwrap();
        let b = portfolio.component("b").unwrap();

        let ab = Correlation::analyze(a, b, &options).unwrap();
        let ba = Correlation::analyze(b, a, &options).unwrap();
        prop_assert_eq!(ab.difference_score(), ba.difference_score());
        prop_assert_eq!(ab.time_in_market(), ba.time_in_market());
    }
}
