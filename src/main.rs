mod config;
mod data;
mod execution;
mod monitoring;
mod strategies;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};

use config::{Config, EnvConfig};
use data::cache::ForecastCache;
use data::gamma_api::PolymarketClient;
use data::types::{Forecast, Portfolio, ProbabilitySource};
use data::weather::NoaaClient;
use execution::executor::{
    execute_event_allocations, execute_signals, SimulatedExecutor, TradeExecutor,
};
use execution::persistence::TradeJournal;
use execution::risk::{check_daily_loss, check_kill_switch};
use execution::simulator::PaperTradingSimulator;
use monitoring::logger::CsvLogger;
use strategies::weather_edge::WeatherEdgeStrategy;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Weathervane starting...");

    let config = Config::load("config.toml")?;
    let env_config = EnvConfig::load()?;

    info!("Dry run mode: {}", config.system.dry_run);
    info!("Paper trading: {}", config.paper_trading.enabled);
    info!("Kill switch: {}", config.strategy.kill_switch);

    info!("Initializing database: {}", config.system.database_path);
    let journal = TradeJournal::new(&config.system.database_path)?;
    let csv_logger = CsvLogger::new(config.system.csv_log_path.clone())?;

    let polymarket = PolymarketClient::new(env_config.polymarket_gamma_url.clone());
    let mut noaa = NoaaClient::new(
        env_config.noaa_base_url.clone(),
        env_config.noaa_user_agent.clone(),
    );
    let cache = ForecastCache::new(Duration::from_secs(config.system.forecast_cache_ttl_secs));

    let strategy = WeatherEdgeStrategy::new(config.strategy.clone());
    let starting_bankroll = config.paper_trading.initial_balance_usd;

    let mut executor: Box<dyn TradeExecutor> = if config.paper_trading.enabled {
        Box::new(PaperTradingSimulator::new(config.paper_trading.clone()))
    } else {
        Box::new(SimulatedExecutor::new(starting_bankroll))
    };

    info!(
        interval_secs = config.system.scan_interval_secs,
        "Bot initialized, entering scan loop"
    );

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.system.scan_interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_scan(
                    &config,
                    &polymarket,
                    &mut noaa,
                    &cache,
                    &strategy,
                    &journal,
                    &csv_logger,
                    executor.as_mut(),
                    starting_bankroll,
                ).await {
                    error!(error = %e, "scan cycle failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_scan(
    config: &Config,
    polymarket: &PolymarketClient,
    noaa: &mut NoaaClient,
    cache: &ForecastCache,
    strategy: &WeatherEdgeStrategy,
    journal: &TradeJournal,
    csv_logger: &CsvLogger,
    executor: &mut dyn TradeExecutor,
    starting_bankroll: f64,
) -> Result<()> {
    let now = Utc::now();
    let today = now.date_naive();

    // Realized P&L accrues only once a resolution flow writes
    // update_trade_resolution; until one exists daily_pnl stays 0.0
    // and the loss halt below cannot trip.
    let portfolio = snapshot_portfolio(journal, executor, starting_bankroll, today)?;

    let halt = check_kill_switch(config.strategy.kill_switch);
    let halt = if halt.allowed {
        check_daily_loss(
            portfolio.daily_pnl,
            portfolio.starting_bankroll,
            config.strategy.daily_loss_limit_pct,
        )
    } else {
        halt
    };
    if !halt.allowed {
        warn!(reason = %halt.reason, "cycle halted");
        csv_logger.log_event(&halt.reason)?;
        return Ok(());
    }

    let bankroll = config.strategy.max_bankroll.min(portfolio.total_value);
    let mut trade_count = 0;

    // Binary threshold markets
    let markets = polymarket.fetch_weather_markets(today).await?;
    if markets.is_empty() {
        info!("no weather markets found this cycle");
    } else {
        for market in &markets {
            journal.cache_market(market, now)?;
        }

        // One forecast per (location, date), fanned back out per market
        let mut forecasts: HashMap<String, Forecast> = HashMap::new();
        for market in &markets {
            if forecasts.contains_key(&market.market_id) {
                continue;
            }
            let Some(forecast) = lookup_forecast(
                noaa,
                cache,
                &market.location,
                market.lat,
                market.lon,
                market.event_date,
            )
            .await
            else {
                continue;
            };
            forecasts.insert(market.market_id.clone(), forecast);
        }

        let signals = strategy.scan(
            &markets,
            &forecasts,
            &HashMap::new(),
            bankroll,
            &portfolio,
            now,
        );

        if !signals.is_empty() {
            let trades = execute_signals(
                &signals,
                &markets,
                &config.strategy,
                &portfolio,
                journal,
                executor,
                Some(csv_logger),
            )?;
            trade_count += trades.len();
        }
    }

    // Multi-outcome bucket events
    let events = polymarket.fetch_weather_events(today).await?;
    for event in &events {
        let days_out = (event.event_date - today).num_days();
        if !(0..=config.strategy.max_forecast_horizon_days).contains(&days_out) {
            continue;
        }
        let Some(forecast) = lookup_forecast(
            noaa,
            cache,
            &event.location,
            event.lat,
            event.lon,
            event.event_date,
        )
        .await
        else {
            continue;
        };

        let source = ProbabilitySource::Point(&forecast);
        let allocations = strategy.scan_event(event, &source, bankroll, now);
        if allocations.is_empty() {
            continue;
        }

        // Fresh snapshot so event buckets see cash already committed
        // earlier in this cycle
        let snapshot = snapshot_portfolio(journal, executor, starting_bankroll, today)?;
        let trades = execute_event_allocations(
            event,
            &allocations,
            &config.strategy,
            &snapshot,
            journal,
            executor,
            Some(csv_logger),
            now,
        )?;
        trade_count += trades.len();
    }

    info!(
        markets = markets.len(),
        events = events.len(),
        trades = trade_count,
        balance = executor.balance(),
        "scan cycle complete"
    );
    Ok(())
}

fn snapshot_portfolio(
    journal: &TradeJournal,
    executor: &dyn TradeExecutor,
    starting_bankroll: f64,
    today: NaiveDate,
) -> Result<Portfolio> {
    let open_exposure: f64 = journal.open_trades()?.iter().map(|t| t.size).sum();
    let cash = executor.balance();
    Ok(Portfolio {
        cash,
        total_value: cash + open_exposure,
        starting_bankroll,
        daily_pnl: journal.daily_pnl(today)?,
    })
}

async fn lookup_forecast(
    noaa: &mut NoaaClient,
    cache: &ForecastCache,
    location: &str,
    lat: f64,
    lon: f64,
    date: NaiveDate,
) -> Option<Forecast> {
    match cache.get(location, date) {
        Some(hit) => Some(hit),
        None => {
            let Some(fetched) = noaa.get_forecast(lat, lon, date).await else {
                warn!(location, date = %date, "no forecast available");
                return None;
            };
            cache.insert(location, date, fetched.clone());
            Some(fetched)
        }
    }
}
