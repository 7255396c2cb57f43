use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};

/// Weather metric a market resolves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TemperatureHigh,
    TemperatureLow,
    Precipitation,
    Snowfall,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TemperatureHigh => "temperature_high",
            Metric::TemperatureLow => "temperature_low",
            Metric::Precipitation => "precipitation",
            Metric::Snowfall => "snowfall",
        }
    }

    pub fn is_temperature(&self) -> bool {
        matches!(self, Metric::TemperatureHigh | Metric::TemperatureLow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Above,
    Below,
    Between,
}

/// A Polymarket weather contract with parsed event details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherMarket {
    pub market_id: String,
    pub token_id: String,
    pub question: String,
    pub location: String,
    pub lat: f64,
    pub lon: f64,
    pub event_date: NaiveDate,
    pub metric: Metric,
    pub threshold: f64,
    pub comparison: Comparison,
    pub yes_price: f64,
    pub no_price: f64,
    pub volume: f64,
    pub close_date: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
}

/// NOAA point forecast for a location and target date.
///
/// At least one of the numeric fields must be present for the
/// forecast to be usable by the probability model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub location: String,
    pub forecast_date: NaiveDate,
    pub retrieved_at: DateTime<Utc>,
    pub temperature_high: Option<f64>,
    pub temperature_low: Option<f64>,
    /// Probability of precipitation, already calibrated to 0-1.
    pub precip_probability: Option<f64>,
    pub narrative: String,
    /// When NOAA last updated this forecast. Drives staleness decay.
    pub update_time: Option<DateTime<Utc>>,
}

impl Forecast {
    pub fn has_data(&self) -> bool {
        self.temperature_high.is_some()
            || self.temperature_low.is_some()
            || self.precip_probability.is_some()
    }
}

/// NBM-style percentile temperature distribution for a station and date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileForecast {
    pub station_id: String,
    pub forecast_date: NaiveDate,
    pub p10: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub std_dev: Option<f64>,
}

impl PercentileForecast {
    /// Present (percentile, value) pairs in ascending percentile order.
    pub fn points(&self) -> Vec<(f64, f64)> {
        [
            (0.10, self.p10),
            (0.25, self.p25),
            (0.50, self.p50),
            (0.75, self.p75),
            (0.90, self.p90),
        ]
        .iter()
        .filter_map(|&(pct, val)| val.map(|v| (pct, v)))
        .collect()
    }
}

/// What the probability model gets to work with for one market.
///
/// Branch selection in the model is an exhaustive match over this,
/// not a chain of Option checks.
#[derive(Debug, Clone, Copy)]
pub enum ProbabilitySource<'a> {
    Point(&'a Forecast),
    Percentiles(&'a Forecast, &'a PercentileForecast),
}

impl<'a> ProbabilitySource<'a> {
    pub fn forecast(&self) -> &'a Forecast {
        match self {
            ProbabilitySource::Point(f) => f,
            ProbabilitySource::Percentiles(f, _) => f,
        }
    }
}

/// One mutually exclusive outcome slice of a multi-outcome event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeBucket {
    pub token_id: String,
    pub label: String,
    pub yes_price: f64,
    pub no_price: f64,
    /// Bucket bounds; None means open-ended on that side.
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// A partitioned weather event owning an ordered list of outcome buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherEvent {
    pub event_id: String,
    pub title: String,
    pub location: String,
    pub lat: f64,
    pub lon: f64,
    pub event_date: NaiveDate,
    pub metric: Metric,
    pub buckets: Vec<OutcomeBucket>,
    pub close_date: DateTime<Utc>,
}

impl WeatherEvent {
    /// Buckets sorted by lower bound ascending, open-ended-low first.
    pub fn sorted_buckets(&self) -> Vec<OutcomeBucket> {
        let mut buckets = self.buckets.clone();
        buckets.sort_by(|a, b| match (a.lower, b.lower) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        });
        buckets
    }
}

/// Read-only portfolio snapshot. The core never mutates this; the
/// caller debits cash after a fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub total_value: f64,
    pub starting_bankroll: f64,
    pub daily_pnl: f64,
}
