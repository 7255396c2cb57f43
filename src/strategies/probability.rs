use crate::data::types::{Comparison, Metric, PercentileForecast, ProbabilitySource};

// Fallback forecast-error standard deviations (Fahrenheit), used when no
// percentile distribution is available. Tunable priors, not measured.
const FALLBACK_STD_DEV_1DAY: f64 = 3.0;
const FALLBACK_STD_DEV_2DAY: f64 = 4.0;
const FALLBACK_STD_DEV_DEFAULT: f64 = 5.0;

/// Convert a forecast into P(event) for a market's metric/threshold/comparison.
///
/// Returns None whenever the required input is missing; callers treat that
/// as "skip this market", never as probability zero.
pub fn probability(
    source: &ProbabilitySource,
    metric: Metric,
    threshold: f64,
    comparison: Comparison,
    horizon_days: i64,
) -> Option<f64> {
    match metric {
        // Snowfall reuses probability-of-precipitation as a proxy for
        // snowfall amount. Known approximation pending a proper
        // snow-to-liquid-ratio model; do not "fix" silently, it would
        // change trading behavior.
        Metric::Precipitation | Metric::Snowfall => {
            precip_probability(source.forecast().precip_probability, comparison)
        }
        Metric::TemperatureHigh | Metric::TemperatureLow => {
            temperature_probability(source, metric, threshold, comparison, horizon_days)
        }
    }
}

/// P(lower < X <= upper) for one outcome bucket of a partitioned event.
///
/// Open-ended bounds contribute probability 1 (no lower) or 0 (no upper).
/// Temperature metrics only; bucket bounds on precipitation amounts cannot
/// be derived from a probability-of-precipitation field.
pub fn bucket_probability(
    source: &ProbabilitySource,
    metric: Metric,
    lower: Option<f64>,
    upper: Option<f64>,
    horizon_days: i64,
) -> Option<f64> {
    if !metric.is_temperature() {
        return None;
    }

    let above_lower = match lower {
        Some(lo) => temperature_probability(source, metric, lo, Comparison::Above, horizon_days)?,
        None => 1.0,
    };
    let above_upper = match upper {
        Some(hi) => temperature_probability(source, metric, hi, Comparison::Above, horizon_days)?,
        None => 0.0,
    };

    Some((above_lower - above_upper).max(0.0))
}

fn precip_probability(pop: Option<f64>, comparison: Comparison) -> Option<f64> {
    let pop = pop?;
    match comparison {
        Comparison::Above => Some(pop),
        Comparison::Below => Some(1.0 - pop),
        Comparison::Between => None,
    }
}

fn temperature_probability(
    source: &ProbabilitySource,
    metric: Metric,
    threshold: f64,
    comparison: Comparison,
    horizon_days: i64,
) -> Option<f64> {
    let above = match source {
        ProbabilitySource::Percentiles(forecast, nbm) => {
            match interpolate_percentile_above(nbm, threshold) {
                Some(p) => p,
                None => normal_above(forecast_point(forecast, metric)?, threshold, std_dev_for(Some(nbm), horizon_days))?,
            }
        }
        ProbabilitySource::Point(forecast) => {
            normal_above(forecast_point(forecast, metric)?, threshold, std_dev_for(None, horizon_days))?
        }
    };

    match comparison {
        Comparison::Above => Some(above),
        Comparison::Below => Some(1.0 - above),
        // "between" has no probability calculation yet; explicit gap.
        Comparison::Between => None,
    }
}

fn forecast_point(forecast: &crate::data::types::Forecast, metric: Metric) -> Option<f64> {
    match metric {
        Metric::TemperatureHigh => forecast.temperature_high,
        Metric::TemperatureLow => forecast.temperature_low,
        _ => None,
    }
}

fn std_dev_for(nbm: Option<&PercentileForecast>, horizon_days: i64) -> f64 {
    if let Some(sd) = nbm.and_then(|n| n.std_dev) {
        if sd > 0.0 {
            return sd;
        }
    }
    if horizon_days <= 1 {
        FALLBACK_STD_DEV_1DAY
    } else if horizon_days <= 2 {
        FALLBACK_STD_DEV_2DAY
    } else {
        FALLBACK_STD_DEV_DEFAULT
    }
}

/// P(X > threshold) under a normal model centered on the point forecast.
fn normal_above(point_forecast: f64, threshold: f64, std_dev: f64) -> Option<f64> {
    if std_dev <= 0.0 {
        return None;
    }
    let z = (threshold - point_forecast) / std_dev;
    Some(1.0 - normal_cdf(z))
}

/// Estimate P(X > threshold) from sparse (percentile, value) points by
/// linear CDF interpolation. Outside the known range the CDF is extended
/// with the adjacent segment's slope and clamped, so the estimate
/// saturates toward 0 or 1 and never inverts direction.
fn interpolate_percentile_above(nbm: &PercentileForecast, threshold: f64) -> Option<f64> {
    let points = nbm.points();
    if points.len() < 2 {
        return None;
    }

    let (first_pct, first_val) = points[0];
    let (last_pct, last_val) = points[points.len() - 1];

    let cdf = if threshold <= first_val {
        let (next_pct, next_val) = points[1];
        let slope = segment_slope(first_pct, first_val, next_pct, next_val);
        (first_pct - slope * (first_val - threshold)).clamp(0.0, first_pct)
    } else if threshold >= last_val {
        let (prev_pct, prev_val) = points[points.len() - 2];
        let slope = segment_slope(prev_pct, prev_val, last_pct, last_val);
        (last_pct + slope * (threshold - last_val)).clamp(last_pct, 1.0)
    } else {
        let mut cdf_at_threshold = None;
        for window in points.windows(2) {
            let (pct_low, val_low) = window[0];
            let (pct_high, val_high) = window[1];
            if val_low <= threshold && threshold <= val_high {
                cdf_at_threshold = Some(if val_high == val_low {
                    // Flat region: midpoint percentile
                    (pct_low + pct_high) / 2.0
                } else {
                    let fraction = (threshold - val_low) / (val_high - val_low);
                    pct_low + fraction * (pct_high - pct_low)
                });
                break;
            }
        }
        cdf_at_threshold?
    };

    Some(1.0 - cdf)
}

fn segment_slope(pct_low: f64, val_low: f64, pct_high: f64, val_high: f64) -> f64 {
    if val_high == val_low {
        0.0
    } else {
        (pct_high - pct_low) / (val_high - val_low)
    }
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / f64::sqrt(2.0)))
}

/// Error function approximation (Abramowitz & Stegun 7.1.26).
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}
