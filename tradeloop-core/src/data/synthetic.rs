//! Synthetic market data for tests, benches and offline job runs.
//!
//! Produces a simple random walk per symbol from a starting price of 100.0,
//! seeded deterministically from the symbol name so repeated runs produce
//! identical data. Indicator columns are rough trailing approximations:
//! good enough to exercise the pipeline, not to evaluate a model.

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::memory::InMemorySource;
use crate::domain::{
    BreadthRow, ChipRow, DailyRecord, IndicatorRow, MarginRow, PriceBar, StaticFundamental,
};

fn seeded_rng(key: &str) -> StdRng {
    let seed_bytes = blake3::hash(key.as_bytes());
    StdRng::from_seed(*seed_bytes.as_bytes())
}

fn trading_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        let weekday = current.weekday();
        if weekday != chrono::Weekday::Sat && weekday != chrono::Weekday::Sun {
            days.push(current);
        }
        current += chrono::Duration::days(1);
    }
    days
}

fn trailing_mean(values: &[f64], end: usize, period: usize) -> Option<f64> {
    if end + 1 < period {
        return None;
    }
    let slice = &values[end + 1 - period..=end];
    Some(slice.iter().sum::<f64>() / period as f64)
}

/// Market-wide breadth derived from the index, identical for every symbol.
fn market_breadth(market: &[f64], i: usize) -> Option<BreadthRow> {
    let level = |lag: usize| i.checked_sub(lag).and_then(|j| market.get(j)).copied();
    let now = market.get(i).copied()?;
    let spread = |lag: usize| {
        level(lag).map(|past| (50.0 + (now / past - 1.0) * 1_000.0).clamp(5.0, 95.0))
    };
    Some(BreadthRow {
        breadth_ma_short: spread(5),
        breadth_ma_long: spread(20),
    })
}

/// Generate joined daily records for one symbol on weekdays in `[start, end]`.
pub fn generate_symbol_records(
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    market: &[f64],
) -> Vec<DailyRecord> {
    let mut rng = seeded_rng(symbol);
    let days = trading_days(start, end);

    let mut closes = Vec::with_capacity(days.len());
    let mut price = 100.0_f64;
    for _ in &days {
        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        price *= 1.0 + daily_return;
        closes.push(price);
    }

    days.iter()
        .enumerate()
        .map(|(i, &date)| {
            let close = closes[i];
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01_f64));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01_f64));
            let volume = rng.gen_range(500_000.0..5_000_000.0_f64).round();
            let change_pct = (i > 0).then(|| (close / closes[i - 1] - 1.0) * 100.0);

            DailyRecord {
                bar: PriceBar {
                    symbol: symbol.to_string(),
                    date,
                    open,
                    high,
                    low,
                    close,
                    volume,
                    change_pct,
                },
                indicators: Some(IndicatorRow {
                    ma5: trailing_mean(&closes, i, 5),
                    ma20: trailing_mean(&closes, i, 20),
                    ma60: trailing_mean(&closes, i, 60),
                    rsi: Some(rng.gen_range(20.0..80.0)),
                    macd_diff: Some(rng.gen_range(-2.0..2.0)),
                    macd_dea: Some(rng.gen_range(-2.0..2.0)),
                    k: Some(rng.gen_range(0.0..100.0)),
                    d: Some(rng.gen_range(0.0..100.0)),
                    atr: Some(high - low),
                }),
                chips: Some(ChipRow {
                    foreign_net: Some(rng.gen_range(-0.1..0.1_f64) * volume),
                    trust_net: Some(rng.gen_range(-0.05..0.05_f64) * volume),
                    dealer_net: Some(rng.gen_range(-0.05..0.05_f64) * volume),
                }),
                margin: Some(MarginRow {
                    margin_net: Some(rng.gen_range(-500.0..500.0_f64).round()),
                    short_net: Some(rng.gen_range(-100.0..100.0_f64).round()),
                }),
                market_close: market.get(i).copied(),
                breadth: market_breadth(market, i),
            }
        })
        .collect()
}

/// Build an in-memory universe of synthetic symbols sharing one market index.
///
/// Each symbol also gets a fundamentals snapshot at `start` and one at the
/// midpoint of the range, so point-in-time lookups have something to do.
pub fn synthetic_universe(symbols: &[&str], start: NaiveDate, end: NaiveDate) -> InMemorySource {
    let days = trading_days(start, end);
    let mut market_rng = seeded_rng("^MARKET");
    let mut level = 10_000.0_f64;
    let market: Vec<f64> = days
        .iter()
        .map(|_| {
            level *= 1.0 + market_rng.gen_range(-0.015..0.015_f64);
            level
        })
        .collect();

    let midpoint = days.get(days.len() / 2).copied().unwrap_or(start);
    let mut source = InMemorySource::new();
    for symbol in symbols {
        source.insert_records(*symbol, generate_symbol_records(symbol, start, end, &market));

        let mut rng = seeded_rng(&format!("{symbol}/fundamentals"));
        for as_of in [start, midpoint] {
            source.insert_fundamental(StaticFundamental {
                symbol: symbol.to_string(),
                as_of,
                pe: Some(rng.gen_range(5.0..40.0)),
                pb: Some(rng.gen_range(0.5..8.0)),
                dividend_yield: Some(rng.gen_range(0.0..6.0)),
                revenue_yoy: Some(rng.gen_range(-20.0..40.0)),
                gross_margin: Some(rng.gen_range(5.0..60.0)),
                debt_ratio: Some(rng.gen_range(10.0..70.0)),
            });
        }
    }
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MarketDataSource;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn synthetic_data_is_deterministic() {
        let a = generate_symbol_records("AAA", date(2024, 1, 1), date(2024, 3, 1), &[]);
        let b = generate_symbol_records("AAA", date(2024, 1, 1), date(2024, 3, 1), &[]);
        assert_eq!(a, b);
        let c = generate_symbol_records("BBB", date(2024, 1, 1), date(2024, 3, 1), &[]);
        assert_ne!(a[5].bar.close, c[5].bar.close);
    }

    #[test]
    fn synthetic_data_skips_weekends() {
        let records = generate_symbol_records("AAA", date(2024, 1, 1), date(2024, 1, 14), &[]);
        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.bar.is_sane()));
    }

    #[test]
    fn universe_has_two_fundamental_snapshots() {
        let source = synthetic_universe(&["AAA", "BBB"], date(2024, 1, 1), date(2024, 6, 30));
        assert_eq!(source.symbol_count(), 2);
        assert_eq!(source.fundamentals("AAA").unwrap().len(), 2);
    }
}
