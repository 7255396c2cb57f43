use crate::strategies::types::{BucketAllocation, Side};
use tracing::{debug, info, warn};

/// Round a dollar amount to cents.
fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Fractional-Kelly position size for a binary market.
///
/// `model_probability` and `market_price` refer to the YES outcome; the
/// NO side is sized from the complements. Returns (kelly_fraction,
/// recommended_size_dollars), both zero when there is no tradeable edge.
pub fn calculate_kelly(
    model_probability: f64,
    market_price: f64,
    bankroll: f64,
    kelly_multiplier: f64,
    min_edge: f64,
) -> (f64, f64) {
    if model_probability <= 0.0 || model_probability >= 1.0 {
        warn!(probability = model_probability, "model probability out of range");
        return (0.0, 0.0);
    }
    if market_price <= 0.0 || market_price >= 1.0 {
        warn!(price = market_price, "market price out of range");
        return (0.0, 0.0);
    }
    if bankroll <= 0.0 {
        warn!(bankroll, "bankroll not positive");
        return (0.0, 0.0);
    }

    let edge = model_probability - market_price;
    if edge.abs() < min_edge {
        debug!(edge, threshold = min_edge, "edge below threshold");
        return (0.0, 0.0);
    }

    let kelly_raw = if edge > 0.0 {
        // Buy YES: f* = (p - q) / (1 - q)
        edge / (1.0 - market_price)
    } else {
        // Buy NO: same formula from the NO side's perspective
        let no_prob = 1.0 - model_probability;
        let no_price = 1.0 - market_price;
        let no_edge = no_prob - no_price;
        if no_edge <= 0.0 {
            return (0.0, 0.0);
        }
        no_edge / (1.0 - no_price)
    };

    // Never bet more than the multiplier itself, however large raw
    // Kelly gets. This is the brake against model overconfidence.
    let kelly_fraction = (kelly_raw * kelly_multiplier).clamp(0.0, kelly_multiplier);
    let recommended_size = round_cents(kelly_fraction * bankroll);

    info!(
        edge,
        kelly_raw,
        kelly_fraction,
        recommended_size,
        "kelly calculated"
    );

    (kelly_fraction, recommended_size)
}

/// Multi-outcome Kelly sizing across the buckets of one event.
///
/// Independent binary Kelly per bucket, ranked by |edge| descending, top
/// `max_buckets` kept, then scaled down proportionally if the summed size
/// exceeds the event position cap.
///
/// Panics if `bucket_probs` and `market_prices` differ in length; that is
/// a caller bug, not a data condition.
pub fn calculate_multi_outcome_kelly(
    bucket_probs: &[f64],
    market_prices: &[f64],
    bankroll: f64,
    kelly_multiplier: f64,
    min_edge: f64,
    max_buckets: usize,
    position_cap: Option<f64>,
) -> Vec<BucketAllocation> {
    assert_eq!(
        bucket_probs.len(),
        market_prices.len(),
        "bucket probabilities and prices must be the same length"
    );

    let mut candidates: Vec<(BucketAllocation, f64)> = Vec::new();

    for (i, (&prob, &price)) in bucket_probs.iter().zip(market_prices.iter()).enumerate() {
        if prob <= 0.0 || prob >= 1.0 || price <= 0.0 || price >= 1.0 {
            continue;
        }

        let edge = prob - price;
        if edge.abs() < min_edge {
            continue;
        }

        let (kelly_fraction, size) =
            calculate_kelly(prob, price, bankroll, kelly_multiplier, min_edge);
        if size <= 0.0 {
            continue;
        }

        let side = if edge > 0.0 { Side::Yes } else { Side::No };
        candidates.push((
            BucketAllocation {
                bucket_index: i,
                side,
                model_probability: prob,
                edge,
                kelly_fraction,
                size,
            },
            edge.abs(),
        ));
    }

    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let buckets_with_edge = candidates.len();
    candidates.truncate(max_buckets);

    let mut selected: Vec<BucketAllocation> =
        candidates.into_iter().map(|(alloc, _)| alloc).collect();
    if selected.is_empty() {
        return selected;
    }

    // Budget-normalize: capital competes across buckets of one event
    let total_size: f64 = selected.iter().map(|a| a.size).sum();
    let cap = position_cap.unwrap_or(bankroll * kelly_multiplier);
    if total_size > cap && total_size > 0.0 {
        let scale = cap / total_size;
        for alloc in &mut selected {
            alloc.kelly_fraction *= scale;
            alloc.size = round_cents(alloc.size * scale);
        }
    }

    info!(
        buckets_with_edge,
        buckets_selected = selected.len(),
        total_size = selected.iter().map(|a| a.size).sum::<f64>(),
        "multi-outcome kelly"
    );

    selected
}
