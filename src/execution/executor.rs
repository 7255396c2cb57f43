use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::StrategyConfig;
use crate::data::types::{Portfolio, WeatherEvent, WeatherMarket};
use crate::execution::correlation::correlated_exposure;
use crate::execution::persistence::TradeJournal;
use crate::execution::risk::{
    check_bankroll_limit, check_daily_loss, check_kill_switch, check_position_limit,
};
use crate::execution::types::{new_trade_id, Trade, TradeStatus};
use crate::monitoring::logger::CsvLogger;
use crate::strategies::types::{BucketAllocation, Confidence, Signal};

/// Anything that can turn a sized signal into a trade. The simulated
/// and paper implementations differ only in fill behavior, so the scan
/// loop stays identical across modes.
pub trait TradeExecutor {
    fn execute(&mut self, signal: &Signal, size: f64) -> Result<Option<Trade>>;
    fn balance(&self) -> f64;
}

/// Dry-run executor: every order fills in full at the signal price.
pub struct SimulatedExecutor {
    balance: f64,
}

impl SimulatedExecutor {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            balance: initial_balance,
        }
    }
}

impl TradeExecutor for SimulatedExecutor {
    fn execute(&mut self, signal: &Signal, size: f64) -> Result<Option<Trade>> {
        if size > self.balance {
            warn!(size, balance = self.balance, "simulated order exceeds balance");
            return Ok(None);
        }
        self.balance -= size;

        Ok(Some(Trade {
            trade_id: new_trade_id(),
            market_id: signal.market_id.clone(),
            side: signal.side,
            price: signal.market_price,
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

/// Why a vetted signal was dropped before reaching the executor.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("open trade already exists for this market")]
    DuplicateTrade,
    #[error("correlated exposure ${existing:.2} already at cap ${cap:.2}")]
    ExposureAtCap { existing: f64, cap: f64 },
    #[error("{0}")]
    LimitDenied(String),
}

/// Per-signal limit pass: duplicate open trade check, correlated
/// exposure against the position cap (capping the size rather than
/// discarding when only part fits), then the cash check. Returns the
/// approved size.
fn vet_signal(
    signal: &Signal,
    has_open_trade: bool,
    existing_exposure: f64,
    cash: f64,
    total_value: f64,
    config: &StrategyConfig,
) -> std::result::Result<f64, Rejection> {
    if has_open_trade {
        return Err(Rejection::DuplicateTrade);
    }

    let max_position = config.max_bankroll * config.position_cap_pct;
    let mut size = signal.recommended_size;

    let position = check_position_limit(
        existing_exposure + size,
        config.max_bankroll,
        config.position_cap_pct,
    );
    if !position.allowed {
        let available = max_position - existing_exposure;
        if available < 1.0 {
            return Err(Rejection::ExposureAtCap {
                existing: existing_exposure,
                cap: max_position,
            });
        }
        size = available;
    }

    let bankroll = check_bankroll_limit(cash, size, total_value, config.max_bankroll);
    if !bankroll.allowed {
        return Err(Rejection::LimitDenied(bankroll.reason));
    }

    Ok(size)
}

/// Run every hard limit against a batch of signals and execute the
/// survivors. The kill switch and daily loss halt gate the whole
/// batch; everything per-signal goes through `vet_signal`.
pub fn execute_signals(
    signals: &[Signal],
    markets: &[WeatherMarket],
    config: &StrategyConfig,
    portfolio: &Portfolio,
    journal: &TradeJournal,
    executor: &mut dyn TradeExecutor,
    logger: Option<&CsvLogger>,
) -> Result<Vec<Trade>> {
    let kill = check_kill_switch(config.kill_switch);
    if !kill.allowed {
        warn!(reason = %kill.reason, "batch rejected");
        return Ok(Vec::new());
    }
    let loss = check_daily_loss(
        portfolio.daily_pnl,
        portfolio.starting_bankroll,
        config.daily_loss_limit_pct,
    );
    if !loss.allowed {
        warn!(reason = %loss.reason, "batch rejected");
        return Ok(Vec::new());
    }

    let mut cash = portfolio.cash;
    let mut executed = Vec::new();

    for signal in signals {
        let has_open = journal.has_open_trade(&signal.market_id)?;
        // Exposure across all markets on the same weather event shares
        // one cap, so several thresholds on one event cannot stack.
        let existing = correlated_exposure(signal, markets, |id| {
            journal.open_position_size(id).unwrap_or(0.0)
        });

        let size = match vet_signal(signal, has_open, existing, cash, portfolio.total_value, config)
        {
            Ok(size) => size,
            Err(rejection) => {
                info!(market_id = %signal.market_id, %rejection, "signal rejected");
                continue;
            }
        };
        if size < signal.recommended_size {
            info!(
                market_id = %signal.market_id,
                requested = signal.recommended_size,
                capped = size,
                "size capped to fit correlated exposure limit"
            );
        }

        let Some(trade) = executor.execute(signal, size)? else {
            continue;
        };

        journal.insert_trade(&trade)?;
        if let Some(logger) = logger {
            logger.log_trade(&trade)?;
        }
        info!(
            trade_id = %trade.trade_id,
            market_id = %trade.market_id,
            side = trade.side.as_str(),
            price = trade.price,
            size = trade.size,
            edge = trade.edge,
            "trade executed"
        );

        cash -= size;
        executed.push(trade);
    }

    Ok(executed)
}

/// Execute the sized bucket allocations of one multi-outcome event.
///
/// Buckets are journaled under their token ids. All buckets of one
/// event share a single position cap, so exposure left open from
/// earlier cycles counts against today's allocations.
#[allow(clippy::too_many_arguments)]
pub fn execute_event_allocations(
    event: &WeatherEvent,
    allocations: &[BucketAllocation],
    config: &StrategyConfig,
    portfolio: &Portfolio,
    journal: &TradeJournal,
    executor: &mut dyn TradeExecutor,
    logger: Option<&CsvLogger>,
    now: DateTime<Utc>,
) -> Result<Vec<Trade>> {
    let kill = check_kill_switch(config.kill_switch);
    if !kill.allowed {
        warn!(reason = %kill.reason, "event batch rejected");
        return Ok(Vec::new());
    }
    let loss = check_daily_loss(
        portfolio.daily_pnl,
        portfolio.starting_bankroll,
        config.daily_loss_limit_pct,
    );
    if !loss.allowed {
        warn!(reason = %loss.reason, "event batch rejected");
        return Ok(Vec::new());
    }

    let buckets = event.sorted_buckets();
    let days_out = (event.event_date - now.date_naive()).num_days().max(0);

    let mut event_exposure = 0.0;
    for bucket in &buckets {
        event_exposure += journal.open_position_size(&bucket.token_id)?;
    }

    let mut cash = portfolio.cash;
    let mut executed = Vec::new();

    for alloc in allocations {
        let Some(bucket) = buckets.get(alloc.bucket_index) else {
            warn!(
                event_id = %event.event_id,
                bucket_index = alloc.bucket_index,
                "allocation points past the bucket list"
            );
            continue;
        };

        let signal = Signal {
            market_id: bucket.token_id.clone(),
            token_id: bucket.token_id.clone(),
            model_probability: alloc.model_probability,
            market_price: bucket.yes_price,
            edge: alloc.edge,
            side: alloc.side,
            kelly_fraction: alloc.kelly_fraction,
            recommended_size: alloc.size,
            confidence: Confidence::from_edge(alloc.edge.abs()),
            forecast_horizon_days: days_out,
        };

        let has_open = journal.has_open_trade(&signal.market_id)?;
        let size = match vet_signal(
            &signal,
            has_open,
            event_exposure,
            cash,
            portfolio.total_value,
            config,
        ) {
            Ok(size) => size,
            Err(rejection) => {
                info!(
                    event_id = %event.event_id,
                    bucket = %bucket.label,
                    %rejection,
                    "bucket rejected"
                );
                continue;
            }
        };

        let Some(trade) = executor.execute(&signal, size)? else {
            continue;
        };

        journal.insert_trade(&trade)?;
        if let Some(logger) = logger {
            logger.log_trade(&trade)?;
        }
        info!(
            trade_id = %trade.trade_id,
            event_id = %event.event_id,
            bucket = %bucket.label,
            side = trade.side.as_str(),
            price = trade.price,
            size = trade.size,
            "bucket trade executed"
        );

        cash -= size;
        event_exposure += size;
        executed.push(trade);
    }

    Ok(executed)
}
