use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::strategies::types::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Filled,
    Resolved,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Filled => "filled",
            TradeStatus::Resolved => "resolved",
            TradeStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TradeStatus::Pending),
            "filled" => Some(TradeStatus::Filled),
            "resolved" => Some(TradeStatus::Resolved),
            "cancelled" => Some(TradeStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOutcome {
    Won,
    Lost,
}

impl TradeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeOutcome::Won => "won",
            TradeOutcome::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "won" => Some(TradeOutcome::Won),
            "lost" => Some(TradeOutcome::Lost),
            _ => None,
        }
    }
}

/// Executed (simulated) trade record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub market_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub model_probability: f64,
    pub edge: f64,
    pub timestamp: DateTime<Utc>,
    pub status: TradeStatus,
    pub outcome: Option<TradeOutcome>,
    pub actual_pnl: Option<f64>,
}

/// Random 12-hex trade id, short enough for log lines.
pub fn new_trade_id() -> String {
    let mut rng = rand::thread_rng();
    (0..12)
        .map(|_| format!("{:x}", rng.gen_range(0..16)))
        .collect()
}
