use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use tracing::info;

use crate::config::PaperTradingConfig;
use crate::execution::executor::TradeExecutor;
use crate::execution::types::{new_trade_id, Trade, TradeStatus};
use crate::strategies::types::Signal;

/// Paper trading executor: probabilistic fills and random adverse
/// slippage, so dry runs exercise the partial-fill paths a live book
/// would produce.
pub struct PaperTradingSimulator {
    config: PaperTradingConfig,
    balance: f64,
}

impl PaperTradingSimulator {
    pub fn new(config: PaperTradingConfig) -> Self {
        let balance = config.initial_balance_usd;
        info!("Paper trading simulator initialized with ${:.2}", balance);

        Self { config, balance }
    }
}

impl TradeExecutor for PaperTradingSimulator {
    fn execute(&mut self, signal: &Signal, size: f64) -> Result<Option<Trade>> {
        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() >= self.config.fill_rate {
            info!(market_id = %signal.market_id, "order not filled (simulated rejection)");
            return Ok(None);
        }

        // Slippage always moves against us
        let slippage = rng.gen::<f64>() * self.config.slippage_pct;
        let executed_price = (signal.market_price * (1.0 + slippage)).min(0.99);

        if size > self.balance {
            info!(size, balance = self.balance, "insufficient paper balance");
            return Ok(None);
        }
        self.balance -= size;

        info!(
            market_id = %signal.market_id,
            side = signal.side.as_str(),
            price = executed_price,
            size,
            slippage_pct = slippage * 100.0,
            "paper order filled"
        );

        Ok(Some(Trade {
            trade_id: new_trade_id(),
            market_id: signal.market_id.clone(),
            side: signal.side,
            price: executed_price,
            size,
            model_probability: signal.model_probability,
            edge: signal.edge,
            timestamp: Utc::now(),
            status: TradeStatus::Filled,
            outcome: None,
            actual_pnl: None,
        }))
    }

    fn balance(&self) -> f64 {
        self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::types::{Confidence, Side};

    fn signal() -> Signal {
        Signal {
            market_id: "m1".to_string(),
            token_id: "m1-tok".to_string(),
            model_probability: 0.62,
            market_price: 0.40,
            edge: 0.22,
            side: Side::Yes,
            kelly_fraction: 0.09,
            recommended_size: 20.0,
            confidence: Confidence::High,
            forecast_horizon_days: 0,
        }
    }

    fn config(fill_rate: f64, slippage_pct: f64) -> PaperTradingConfig {
        PaperTradingConfig {
            enabled: true,
            fill_rate,
            slippage_pct,
            initial_balance_usd: 500.0,
        }
    }

    #[test]
    fn test_guaranteed_fill_deducts_balance() {
        let mut sim = PaperTradingSimulator::new(config(1.0, 0.0));
        let trade = sim.execute(&signal(), 20.0).unwrap().unwrap();
        assert_eq!(trade.size, 20.0);
        assert_eq!(trade.price, 0.40);
        assert_eq!(sim.balance(), 480.0);
    }

    #[test]
    fn test_zero_fill_rate_never_fills() {
        let mut sim = PaperTradingSimulator::new(config(0.0, 0.0));
        for _ in 0..20 {
            assert!(sim.execute(&signal(), 20.0).unwrap().is_none());
        }
        assert_eq!(sim.balance(), 500.0);
    }

    #[test]
    fn test_slippage_is_adverse_and_bounded() {
        let mut sim = PaperTradingSimulator::new(config(1.0, 0.01));
        for _ in 0..50 {
            let trade = sim.execute(&signal(), 1.0).unwrap().unwrap();
            assert!(trade.price >= 0.40);
            assert!(trade.price <= 0.40 * 1.01 + 1e-12);
        }
    }

    #[test]
    fn test_insufficient_balance_rejected() {
        let mut sim = PaperTradingSimulator::new(config(1.0, 0.0));
        assert!(sim.execute(&signal(), 600.0).unwrap().is_none());
        assert_eq!(sim.balance(), 500.0);
    }
}
