use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Tier from edge magnitude alone, before any freshness adjustment.
    pub fn from_edge(abs_edge: f64) -> Self {
        if abs_edge >= 0.20 {
            Confidence::High
        } else if abs_edge >= 0.15 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// Trading signal from the forecast-vs-market comparison.
///
/// Constructed once per scan pass per qualifying market and handed to
/// the execution layer; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub market_id: String,
    pub token_id: String,
    pub model_probability: f64,
    pub market_price: f64,
    pub edge: f64,
    pub side: Side,
    pub kelly_fraction: f64,
    pub recommended_size: f64,
    pub confidence: Confidence,
    pub forecast_horizon_days: i64,
}

/// One bucket's share of a multi-outcome allocation.
///
/// `model_probability` and `edge` refer to the bucket's YES outcome,
/// matching the convention on `Signal`.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketAllocation {
    pub bucket_index: usize,
    pub side: Side,
    pub model_probability: f64,
    pub edge: f64,
    pub kelly_fraction: f64,
    pub size: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_tiers_from_edge() {
        assert_eq!(Confidence::from_edge(0.25), Confidence::High);
        assert_eq!(Confidence::from_edge(0.20), Confidence::High);
        assert_eq!(Confidence::from_edge(0.17), Confidence::Medium);
        assert_eq!(Confidence::from_edge(0.12), Confidence::Low);
    }
}
