use tracing::info;

use crate::data::types::WeatherMarket;
use crate::strategies::sizing::calculate_kelly;
use crate::strategies::types::{Confidence, Side, Signal};

// Extreme value price thresholds
const EXTREME_LOW_PRICE: f64 = 0.15;
const EXTREME_HIGH_PRICE: f64 = 0.85;
// Reduced Kelly for rule-only signals: half of the standard quarter-Kelly
const RULE_KELLY_MULTIPLIER: f64 = 0.125;
// Rule signals rest on structural mispricing, so the edge floor is
// nearly zero rather than the strategy's min_edge
const RULE_MIN_EDGE: f64 = 0.01;

/// Check a market for extreme mispricing with model confirmation.
///
/// Buy YES when the YES price is under 0.15 and the model says > 0.50;
/// buy NO when the YES price is over 0.85 and the model says < 0.50.
/// A low price alone never fires: both rules require the model to agree
/// on direction, which is also why the signal is tagged high confidence.
pub fn evaluate_extreme_value(
    market: &WeatherMarket,
    model_probability: Option<f64>,
    bankroll: f64,
    horizon_days: i64,
) -> Option<Signal> {
    let prob = model_probability?;

    if market.yes_price < EXTREME_LOW_PRICE && prob > 0.50 {
        let edge = prob - market.yes_price;
        let (kelly_fraction, recommended_size) = calculate_kelly(
            prob,
            market.yes_price,
            bankroll,
            RULE_KELLY_MULTIPLIER,
            RULE_MIN_EDGE,
        );
        if recommended_size > 0.0 {
            info!(
                market_id = %market.market_id,
                side = "YES",
                price = market.yes_price,
                model_prob = prob,
                edge,
                "extreme value signal"
            );
            return Some(Signal {
                market_id: market.market_id.clone(),
                token_id: market.token_id.clone(),
                model_probability: prob,
                market_price: market.yes_price,
                edge,
                side: Side::Yes,
                kelly_fraction,
                recommended_size,
                confidence: Confidence::High,
                forecast_horizon_days: horizon_days,
            });
        }
    } else if market.yes_price > EXTREME_HIGH_PRICE && prob < 0.50 {
        let edge = prob - market.yes_price;
        let (kelly_fraction, recommended_size) = calculate_kelly(
            prob,
            market.yes_price,
            bankroll,
            RULE_KELLY_MULTIPLIER,
            RULE_MIN_EDGE,
        );
        if recommended_size > 0.0 {
            info!(
                market_id = %market.market_id,
                side = "NO",
                price = market.yes_price,
                model_prob = prob,
                edge,
                "extreme value signal"
            );
            return Some(Signal {
                market_id: market.market_id.clone(),
                token_id: market.token_id.clone(),
                model_probability: prob,
                market_price: market.yes_price,
                edge,
                side: Side::No,
                kelly_fraction,
                recommended_size,
                confidence: Confidence::High,
                forecast_horizon_days: horizon_days,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{Comparison, Metric};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn market(yes_price: f64) -> WeatherMarket {
        WeatherMarket {
            market_id: "m1".to_string(),
            token_id: "m1-tok".to_string(),
            question: "Will the high temp in Chicago exceed 90 degrees?".to_string(),
            location: "Chicago".to_string(),
            lat: 41.8781,
            lon: -87.6298,
            event_date: NaiveDate::from_ymd_opt(2026, 2, 17).unwrap(),
            metric: Metric::TemperatureHigh,
            threshold: 90.0,
            comparison: Comparison::Above,
            yes_price,
            no_price: 1.0 - yes_price,
            volume: 10_000.0,
            close_date: Utc.with_ymd_and_hms(2026, 2, 17, 23, 0, 0).unwrap(),
            created_at: None,
        }
    }

    #[test]
    fn test_underpriced_yes_with_confirmation() {
        let signal = evaluate_extreme_value(&market(0.10), Some(0.60), 500.0, 0).unwrap();
        assert_eq!(signal.side, Side::Yes);
        assert_eq!(signal.confidence, Confidence::High);
        assert!(signal.kelly_fraction <= RULE_KELLY_MULTIPLIER);
        assert!(signal.recommended_size > 0.0);
        assert!((signal.edge - 0.50).abs() < 1e-9);
    }

    #[test]
    fn test_overpriced_yes_buys_no() {
        let signal = evaluate_extreme_value(&market(0.90), Some(0.40), 500.0, 1).unwrap();
        assert_eq!(signal.side, Side::No);
        assert_eq!(signal.confidence, Confidence::High);
        assert!(signal.recommended_size > 0.0);
    }

    #[test]
    fn test_no_pure_contrarian_play() {
        // Low price but the model agrees it is unlikely: no signal
        assert!(evaluate_extreme_value(&market(0.10), Some(0.30), 500.0, 0).is_none());
        // High price confirmed likely: no signal
        assert!(evaluate_extreme_value(&market(0.90), Some(0.80), 500.0, 0).is_none());
    }

    #[test]
    fn test_mid_price_never_fires() {
        assert!(evaluate_extreme_value(&market(0.50), Some(0.99), 500.0, 0).is_none());
        assert!(evaluate_extreme_value(&market(0.40), Some(0.01), 500.0, 0).is_none());
    }

    #[test]
    fn test_no_model_probability_no_signal() {
        assert!(evaluate_extreme_value(&market(0.05), None, 500.0, 0).is_none());
    }

    #[test]
    fn test_reduced_multiplier_halves_size() {
        let rule = evaluate_extreme_value(&market(0.10), Some(0.60), 500.0, 0).unwrap();
        let (full_frac, _) = calculate_kelly(0.60, 0.10, 500.0, 0.25, 0.01);
        assert!((rule.kelly_fraction - full_frac / 2.0).abs() < 1e-9);
    }
}
