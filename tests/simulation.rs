use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bts_portfolio::prelude::*;
use chrono::{DateTime, Duration, Utc};

fn at(minutes: i64) -> DateTime<Utc> {
    DateTime::default() + Duration::minutes(minutes)
}

fn hours(h: i64) -> i64 {
    h * 60
}

fn trade(from: i64, to: i64, side: TradeSide, volume: f64, net_profit: f64) -> TradeBuilder {
    TradeBuilder::builder()
        .entry_time(at(from))
        .closing_time(at(to))
        .side(side)
        .volume(volume)
        .net_profit(net_profit)
}

fn component(id: &str, symbol: Option<&str>, trades: Vec<Trade>) -> Component {
    let builder = ComponentBuilder::builder()
        .id(id)
        .initial_balance(1_000.0)
        .backtest_start(at(0))
        .backtest_end(at(hours(24)))
        .trades(trades);
    match symbol {
        Some(symbol) => builder.symbol(symbol).build().unwrap(),
        None => builder.build().unwrap(),
    }
}

fn single(trades: Vec<Trade>) -> Portfolio {
    Portfolio::new(vec![component("main", Some("EURUSD"), trades)]).unwrap()
}

fn close_to(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn single_profitable_trade() {
    let portfolio = single(vec![
        trade(hours(1), hours(5), TradeSide::Buy, 1.0, 100.0).build().unwrap(),
    ]);
    let options = SimulationOptions::builder().time_step(TimeFrame::H1).build().unwrap();
    let result = Simulator::new(portfolio, options).simulate().unwrap();

    assert_eq!(result.balance_bars().len(), 24);
    assert_eq!(result.equity_bars().len(), 24);
    assert!(close_to(result.final_balance(), 1.1));

    let balance = result.balance_bars();
    assert!(close_to(balance[4].close(), 1.0));
    assert!(close_to(balance[5].open(), 1.0));
    assert!(close_to(balance[5].close(), 1.1));

    // interpolated over [1h, 5h]
    let equity = result.equity_bars();
    assert!(close_to(equity[0].close(), 1.0));
    assert!(close_to(equity[1].close(), 1.025));
    assert!(close_to(equity[4].close(), 1.1));
    assert!(close_to(equity[5].close(), 1.1));

    let stats = result.stats();
    assert!(close_to(stats.profit_pct(), 0.1));
    assert_eq!(stats.max_equity_drawdown(), 0.0);
    assert_eq!(stats.ad(), f64::INFINITY);
}

#[test]
fn bars_are_contiguous() {
    let portfolio = single(vec![
        trade(hours(1), hours(3), TradeSide::Buy, 1.0, -50.0).build().unwrap(),
        trade(hours(2), hours(6), TradeSide::Sell, 1.0, 80.0).build().unwrap(),
    ]);
    let result = Simulator::new(portfolio, SimulationOptions::default()).simulate().unwrap();

    for series in [result.balance_bars(), result.equity_bars()] {
        for pair in series.windows(2) {
            assert_eq!(pair[1].open(), pair[0].close());
            assert_eq!(pair[1].open_time() - pair[0].open_time(), Duration::hours(1));
        }
        for bar in series {
            assert!(bar.low() <= bar.open().min(bar.close()));
            assert!(bar.high() >= bar.open().max(bar.close()));
        }
    }
}

#[test]
fn drawdown_statistics() {
    let portfolio = single(vec![
        trade(hours(1), hours(2), TradeSide::Buy, 1.0, -100.0).build().unwrap(),
        trade(hours(3), hours(4), TradeSide::Buy, 1.0, 300.0).build().unwrap(),
    ]);
    let options = SimulationOptions::builder()
        .mode(SimulationMode::BalanceOnly)
        .build()
        .unwrap();
    let result = Simulator::new(portfolio, options).simulate().unwrap();

    assert!(result.equity_bars().is_empty());
    let stats = result.stats();
    assert!(close_to(stats.max_balance_drawdown(), 0.1));
    assert!(close_to(stats.max_balance_drawdown_pct(), 0.1));
    // without equity bars, equity statistics follow the balance
    assert_eq!(stats.max_equity_drawdown(), stats.max_balance_drawdown());
    assert!(close_to(stats.profit_pct(), 0.2));
    assert!(close_to(stats.rd(), 2.0));
}

#[test]
fn empty_portfolio() {
    let mut simulator = Simulator::new(Portfolio::default(), SimulationOptions::default());
    assert_eq!(simulator.simulate(), Err(Error::EmptyPortfolio));
    assert_eq!(simulator.state(), SimulatorState::NotStarted);
}

#[test]
fn precise_mode_is_unimplemented() {
    let options = SimulationOptions::builder().mode(SimulationMode::Precise).build().unwrap();
    let result = Simulator::new(single(vec![]), options).simulate();
    assert_eq!(result, Err(Error::UnimplementedMode(SimulationMode::Precise)));
}

#[test]
fn window_outside_portfolio() {
    let options = SimulationOptions::builder()
        .start_time(at(hours(30)))
        .end_time(at(hours(40)))
        .build()
        .unwrap();
    let result = Simulator::new(single(vec![]), options).simulate();
    assert!(matches!(result, Err(Error::InvalidTimeWindow { .. })));
}

#[test]
fn window_narrows_the_run() {
    let portfolio = single(vec![
        trade(hours(1), hours(2), TradeSide::Buy, 1.0, 100.0).build().unwrap(),
        trade(hours(5), hours(7), TradeSide::Buy, 1.0, 50.0).build().unwrap(),
        trade(hours(11), hours(20), TradeSide::Buy, 1.0, 70.0).build().unwrap(),
    ]);
    let options = SimulationOptions::builder()
        .start_time(at(hours(4)))
        .end_time(at(hours(10)))
        .build()
        .unwrap();
    let result = Simulator::new(portfolio, options).simulate().unwrap();

    assert_eq!(result.start(), at(hours(4)));
    assert_eq!(result.end(), at(hours(10)));
    assert_eq!(result.balance_bars().len(), 6);
    // the first trade closed before the window, the last one opened after it
    assert!(close_to(result.final_balance(), 1.05));
}

#[test]
fn unresolved_asset_pair() {
    let trades = vec![
        trade(hours(1), hours(2), TradeSide::Buy, 1.0, 10.0)
            .symbol("SPX500")
            .build()
            .unwrap(),
        trade(hours(1), hours(3), TradeSide::Sell, 2.0, 10.0)
            .symbol("XAU/USD")
            .entry_price(2000.0)
            .build()
            .unwrap(),
    ];
    let portfolio = Portfolio::new(vec![component("multi", None, trades)]).unwrap();

    let options = SimulationOptions::builder().track_asset_exposure(true).build().unwrap();
    let result = Simulator::new(portfolio.clone(), options).simulate();
    assert!(matches!(
        result,
        Err(Error::UnresolvedAssetPair { component, symbol }) if component == "multi" && symbol == "SPX500"
    ));

    let options = SimulationOptions::builder()
        .track_asset_exposure(true)
        .continue_on_error(true)
        .build()
        .unwrap();
    let result = Simulator::new(portfolio, options).simulate().unwrap();
    assert_eq!(result.exceptions().len(), 1);
    // balance still books the skipped trade
    assert!(close_to(result.final_balance(), 1.02));

    let assets = result.asset_exposure_bars();
    assert_eq!(assets.keys().collect::<Vec<_>>(), ["USD", "XAU"]);
    assert!(close_to(assets["XAU"][1].close(), -2.0));
    assert!(close_to(assets["USD"][1].close(), 4000.0));
    assert_eq!(assets["XAU"][3].close(), 0.0);
    assert_eq!(assets["USD"][3].close(), 0.0);
}

#[test]
fn asset_exposure_from_component_symbol() {
    let portfolio = single(vec![
        trade(hours(1), hours(3), TradeSide::Buy, 2.0, 0.0)
            .entry_price(1.1)
            .build()
            .unwrap(),
    ]);
    let options = SimulationOptions::builder().track_asset_exposure(true).build().unwrap();
    let result = Simulator::new(portfolio, options).simulate().unwrap();

    let eur = &result.asset_exposure_bars()["EUR"];
    let usd = &result.asset_exposure_bars()["USD"];
    assert_eq!(eur.len(), result.balance_bars().len());
    assert_eq!(eur[0].close(), 0.0);
    assert!(close_to(eur[1].close(), 2.0));
    assert!(close_to(usd[2].close(), -2.2));
    assert_eq!(eur[3].close(), 0.0);
    assert!(close_to(eur[3].high(), 2.0));
}

#[test]
fn same_bar_round_trip() {
    let portfolio = single(vec![
        trade(70, 100, TradeSide::Buy, 1.0, 20.0).build().unwrap(),
    ]);
    let options = SimulationOptions::builder()
        .track_correlation(true)
        .track_asset_exposure(true)
        .build()
        .unwrap();
    let result = Simulator::new(portfolio, options).simulate().unwrap();

    let exposure = result.exposure_of("main").unwrap();
    assert!(exposure.long.iter().all(|bar| bar.high() == 0.0));
    assert!(result.asset_exposure_bars()["EUR"].iter().all(|bar| bar.high() == 0.0));
    assert!(close_to(result.final_balance(), 1.02));
}

#[test]
fn component_exposure() {
    let portfolio = single(vec![
        trade(hours(1), hours(3), TradeSide::Buy, 2.0, 0.0).build().unwrap(),
        trade(hours(2), hours(4), TradeSide::Sell, 0.5, 0.0).build().unwrap(),
    ]);
    let options = SimulationOptions::builder().track_correlation(true).build().unwrap();
    let result = Simulator::new(portfolio, options).simulate().unwrap();

    let exposure = result.exposure_of("main").unwrap();
    assert_eq!(exposure.long.len(), 24);
    assert_eq!(exposure.short.len(), 24);
    assert_eq!(exposure.long[1].close(), 2.0);
    assert_eq!(exposure.short[2].close(), 0.5);
    assert_eq!(exposure.long[3].close(), 0.0);
    assert_eq!(exposure.short[4].close(), 0.0);
    assert!(result.exposure_of("other").is_none());
}

#[test]
fn runs_are_deterministic() {
    let portfolio = Portfolio::new(vec![
        component(
            "a",
            Some("EURUSD"),
            vec![trade(hours(1), hours(9), TradeSide::Buy, 1.0, 40.0).build().unwrap()],
        ),
        component(
            "b",
            Some("GBPUSD"),
            vec![trade(hours(2), hours(4), TradeSide::Sell, 3.0, -15.0).build().unwrap()],
        ),
    ])
    .unwrap();
    let options = SimulationOptions::builder()
        .track_asset_exposure(true)
        .track_correlation(true)
        .journal_level(JournalLevel::Bars)
        .build()
        .unwrap();

    let mut simulator = Simulator::new(portfolio, options);
    let first = simulator.simulate().unwrap();
    assert!(matches!(simulator.simulate(), Err(Error::InvalidState(_))));
    simulator.reset();
    let second = simulator.simulate().unwrap();
    assert_eq!(first, second);
}

#[test]
fn cancellation() {
    let cancel = Arc::new(AtomicBool::new(false));
    let portfolio = single(vec![
        trade(hours(1), hours(5), TradeSide::Buy, 1.0, 100.0).build().unwrap(),
    ]);
    let mut simulator =
        Simulator::new(portfolio, SimulationOptions::default()).with_cancellation(Arc::clone(&cancel));

    simulator.start().unwrap();
    for _ in 0..3 {
        assert!(simulator.step().unwrap());
    }
    cancel.store(true, Ordering::Relaxed);
    assert_eq!(simulator.step(), Err(Error::Cancelled { completed_bars: 2 }));
    assert_eq!(simulator.state(), SimulatorState::Stopped);

    cancel.store(false, Ordering::Relaxed);
    simulator.reset();
    assert!(simulator.simulate().is_ok());
}

#[test]
fn journal_levels() {
    let trades = || {
        vec![
            trade(hours(1), hours(2), TradeSide::Buy, 1.0, 10.0).build().unwrap(),
            trade(hours(3), hours(6), TradeSide::Sell, 1.0, -5.0).build().unwrap(),
        ]
    };

    let result = Simulator::new(single(trades()), SimulationOptions::default())
        .simulate()
        .unwrap();
    assert!(result.journal().is_empty());

    let options = SimulationOptions::builder().journal_level(JournalLevel::Trades).build().unwrap();
    let result = Simulator::new(single(trades()), options).simulate().unwrap();
    assert_eq!(result.journal().len(), 4);
    assert!(matches!(
        &result.journal()[0],
        JournalEntry::TradeOpened { component, trade: 0, side: TradeSide::Buy, .. } if component == "main"
    ));
    assert!(matches!(
        &result.journal()[1],
        JournalEntry::TradeClosed { trade: 0, balance_change, .. } if close_to(*balance_change, 0.01)
    ));

    let options = SimulationOptions::builder().journal_level(JournalLevel::Bars).build().unwrap();
    let result = Simulator::new(single(trades()), options).simulate().unwrap();
    let bars = result
        .journal()
        .iter()
        .filter(|entry| matches!(entry, JournalEntry::BarClosed { .. }))
        .count();
    assert_eq!(bars, result.balance_bars().len());
}

#[test]
fn weight_is_not_applied() {
    let heavy = ComponentBuilder::builder()
        .id("heavy")
        .weight(3.0)
        .initial_balance(1_000.0)
        .trade(trade(0, hours(1), TradeSide::Buy, 1.0, 100.0).build().unwrap())
        .build()
        .unwrap();
    let portfolio = Portfolio::new(vec![heavy]).unwrap();
    let result = Simulator::new(portfolio, SimulationOptions::default()).simulate().unwrap();
    assert!(close_to(result.final_balance(), 1.1));
}

#[test]
fn runs_at_every_verbosity() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("trace"))
        .with_test_writer()
        .try_init();

    let portfolio = single(vec![
        trade(hours(1), hours(2), TradeSide::Buy, 1.0, 10.0).build().unwrap(),
    ]);
    for verbosity in [Verbosity::Quiet, Verbosity::Verbose] {
        let options = SimulationOptions::builder().verbosity(verbosity).build().unwrap();
        let result = Simulator::new(portfolio.clone(), options).simulate().unwrap();
        assert!(close_to(result.final_balance(), 1.01));
    }
}
