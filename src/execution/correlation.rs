use tracing::info;

use crate::data::types::WeatherMarket;
use crate::strategies::types::Signal;

/// Correlation key for a market. Markets sharing a key bet on the same
/// underlying weather event regardless of threshold, and share one
/// combined position cap.
pub fn correlation_key(market: &WeatherMarket) -> String {
    format!(
        "{}|{}|{}",
        market.location.to_lowercase(),
        market.metric.as_str(),
        market.event_date.format("%Y-%m-%d")
    )
}

/// Ids of markets correlated with the signal's market (same location,
/// metric, and event date), excluding the signal's own market.
pub fn find_correlated_markets(signal: &Signal, markets: &[WeatherMarket]) -> Vec<String> {
    let Some(target) = markets.iter().find(|m| m.market_id == signal.market_id) else {
        return Vec::new();
    };
    let target_key = correlation_key(target);

    let correlated: Vec<String> = markets
        .iter()
        .filter(|m| m.market_id != signal.market_id && correlation_key(m) == target_key)
        .map(|m| m.market_id.clone())
        .collect();

    if !correlated.is_empty() {
        info!(
            signal_market = %signal.market_id,
            correlated = ?correlated,
            "correlated markets found"
        );
    }
    correlated
}

/// Total open exposure across the signal's market and every correlated
/// market. The risk gate checks this combined sum against the position
/// cap so that several bets on the same event cannot each pass a
/// per-market cap while collectively exceeding it.
pub fn correlated_exposure<F>(
    signal: &Signal,
    markets: &[WeatherMarket],
    get_position_size: F,
) -> f64
where
    F: Fn(&str) -> f64,
{
    let mut total = get_position_size(&signal.market_id);
    for market_id in find_correlated_markets(signal, markets) {
        total += get_position_size(&market_id);
    }
    total
}
