use bts_portfolio::prelude::*;
use chrono::{DateTime, Duration, Utc};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn init_logging(level: &str) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry().with(filter).with(fmt::layer()).try_init()?;

    Ok(())
}

/// Deterministic trades: one every `every` hours, held `hold` hours, alternating wins and losses.
fn synthetic_trades(start: DateTime<Utc>, count: i64, every: i64, hold: i64, side: TradeSide) -> Result<Vec<Trade>> {
    (0..count)
        .map(|i| {
            let entry = start + Duration::hours(i * every);
            let net_profit = if i % 3 == 2 { -40.0 } else { 25.0 + i as f64 };
            TradeBuilder::builder()
                .entry_time(entry)
                .closing_time(entry + Duration::hours(hold))
                .side(side)
                .volume(0.1 * (1 + i % 4) as f64)
                .entry_price(1.08 + 0.001 * i as f64)
                .net_profit(net_profit)
                .build()
        })
        .collect()
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging("info")?;

    let start = DateTime::default();
    let end = start + Duration::days(30);

    let trend = ComponentBuilder::builder()
        .id("trend")
        .symbol("EURUSD")
        .initial_balance(10_000.0)
        .min_allowed_trade_volume(0.01)
        .backtest_start(start)
        .backtest_end(end)
        .trades(synthetic_trades(start, 60, 12, 20, TradeSide::Buy)?)
        .build()?;
    let reversal = ComponentBuilder::builder()
        .id("reversal")
        .symbol("EURUSD")
        .initial_balance(5_000.0)
        .min_allowed_trade_volume(0.01)
        .backtest_start(start)
        .backtest_end(end)
        .trades(synthetic_trades(start + Duration::hours(6), 40, 18, 10, TradeSide::Sell)?)
        .build()?;
    let portfolio = Portfolio::new(vec![trend, reversal])?;

    let normalization = VolumeNormalizationOptions::default()
        .reduction_mode(ReductionMode::DIVIDE_BY_MIN_ALLOWED_TRADE_VOLUME)
        .max_mode(MaxMode::ToConstant)
        .max(10.0)
        .curve(Curve::EaseOut);
    let options = SimulationOptions::builder()
        .time_step(TimeFrame::H4)
        .initial_balance(1.0)
        .track_asset_exposure(true)
        .track_correlation(true)
        .volume_normalization(normalization)
        .build()?;

    let mut simulator = Simulator::new(portfolio, options);
    let result = simulator.simulate()?;
    println!("{}", result.stats());
    println!("Final balance: {:.4}", result.final_balance());

    for (asset, bars) in result.asset_exposure_bars() {
        let peak = bars.iter().map(Bar::high).fold(f64::MIN, f64::max);
        println!("Peak {asset} exposure: {peak:.2}");
    }

    let portfolio = simulator.portfolio();
    let correlation = Correlation::analyze(
        portfolio.component("trend").ok_or("missing trend component")?,
        portfolio.component("reversal").ok_or("missing reversal component")?,
        simulator.options().volume_normalization(),
    )?
    .with_exposure(&result)?;

    let time = correlation.time_in_market();
    println!("Opposite direction: {:.1}%", time.fraction(TimeBucket::OppositeDirection) * 100.0);
    println!("One open: {:.1}%", time.fraction(TimeBucket::OneOpen) * 100.0);
    println!("Difference score: {:.4}", correlation.difference_score());
    println!("High/low scores: {:?} / {:?}", correlation.high_score(), correlation.low_score());

    Ok(())
}
