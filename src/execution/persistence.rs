use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::data::types::WeatherMarket;
use crate::execution::types::{Trade, TradeOutcome, TradeStatus};
use crate::strategies::types::Side;

pub struct TradeJournal {
    conn: Connection,
}

impl TradeJournal {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                trade_id TEXT PRIMARY KEY,
                market_id TEXT NOT NULL,
                side TEXT NOT NULL,
                price REAL NOT NULL,
                size REAL NOT NULL,
                model_probability REAL NOT NULL,
                edge REAL NOT NULL,
                timestamp TIMESTAMP NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                outcome TEXT,
                actual_pnl REAL
            );

            CREATE TABLE IF NOT EXISTS daily_snapshots (
                date TEXT PRIMARY KEY,
                starting_balance REAL NOT NULL,
                ending_balance REAL NOT NULL,
                realized_pnl REAL NOT NULL,
                trade_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS markets (
                market_id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                location TEXT NOT NULL,
                metric TEXT NOT NULL,
                event_date TEXT NOT NULL,
                threshold REAL NOT NULL,
                cached_at TIMESTAMP NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_trades_market_id ON trades(market_id);
            CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status);
            CREATE INDEX IF NOT EXISTS idx_trades_timestamp ON trades(timestamp);
            "#,
        )?;

        Ok(Self { conn })
    }

    pub fn insert_trade(&self, trade: &Trade) -> Result<()> {
        self.conn.execute(
            "INSERT INTO trades (trade_id, market_id, side, price, size, model_probability,
                                 edge, timestamp, status, outcome, actual_pnl)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                trade.trade_id,
                trade.market_id,
                trade.side.as_str(),
                trade.price,
                trade.size,
                trade.model_probability,
                trade.edge,
                trade.timestamp.to_rfc3339(),
                trade.status.as_str(),
                trade.outcome.map(|o| o.as_str()),
                trade.actual_pnl,
            ],
        )?;
        Ok(())
    }

    /// Dollars currently committed to a market across pending and
    /// filled trades. Resolved and cancelled trades no longer count.
    pub fn open_position_size(&self, market_id: &str) -> Result<f64> {
        let total: Option<f64> = self.conn.query_row(
            "SELECT SUM(size) FROM trades
             WHERE market_id = ?1 AND status IN ('pending', 'filled')",
            params![market_id],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }

    pub fn has_open_trade(&self, market_id: &str) -> Result<bool> {
        let count: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM trades
             WHERE market_id = ?1 AND status IN ('pending', 'filled')",
            params![market_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn update_trade_status(&self, trade_id: &str, status: TradeStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE trades SET status = ?1 WHERE trade_id = ?2",
            params![status.as_str(), trade_id],
        )?;
        Ok(())
    }

    pub fn update_trade_resolution(
        &self,
        trade_id: &str,
        outcome: TradeOutcome,
        pnl: f64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE trades SET status = 'resolved', outcome = ?1, actual_pnl = ?2
             WHERE trade_id = ?3",
            params![outcome.as_str(), pnl, trade_id],
        )?;
        Ok(())
    }

    /// Realized P&L for trades resolved on the given date.
    pub fn daily_pnl(&self, date: NaiveDate) -> Result<f64> {
        let pnl: Option<f64> = self.conn.query_row(
            "SELECT SUM(COALESCE(actual_pnl, 0)) FROM trades
             WHERE DATE(timestamp) = ?1 AND status = 'resolved'",
            params![date.format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )?;
        Ok(pnl.unwrap_or(0.0))
    }

    pub fn save_daily_snapshot(
        &self,
        date: NaiveDate,
        starting_balance: f64,
        ending_balance: f64,
        realized_pnl: f64,
        trade_count: usize,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO daily_snapshots
                 (date, starting_balance, ending_balance, realized_pnl, trade_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                date.format("%Y-%m-%d").to_string(),
                starting_balance,
                ending_balance,
                realized_pnl,
                trade_count,
            ],
        )?;
        Ok(())
    }

    pub fn cache_market(&self, market: &WeatherMarket, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO markets
                 (market_id, question, location, metric, event_date, threshold, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                market.market_id,
                market.question,
                market.location,
                market.metric.as_str(),
                market.event_date.format("%Y-%m-%d").to_string(),
                market.threshold,
                now.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn market_metadata(&self, market_id: &str) -> Result<Option<(String, String)>> {
        let row = self
            .conn
            .query_row(
                "SELECT location, question FROM markets WHERE market_id = ?1",
                params![market_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    pub fn open_trades(&self) -> Result<Vec<Trade>> {
        let mut stmt = self.conn.prepare(
            "SELECT trade_id, market_id, side, price, size, model_probability,
                    edge, timestamp, status, outcome, actual_pnl
             FROM trades
             WHERE status IN ('pending', 'filled')",
        )?;

        let trades = stmt.query_map([], |row| {
            let side_str: String = row.get(2)?;
            let side = if side_str == "YES" { Side::Yes } else { Side::No };

            let timestamp_str: String = row.get(7)?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            let status_str: String = row.get(8)?;
            let outcome_str: Option<String> = row.get(9)?;

            Ok(Trade {
                trade_id: row.get(0)?,
                market_id: row.get(1)?,
                side,
                price: row.get(3)?,
                size: row.get(4)?,
                model_probability: row.get(5)?,
                edge: row.get(6)?,
                timestamp,
                status: TradeStatus::parse(&status_str).unwrap_or(TradeStatus::Pending),
                outcome: outcome_str.and_then(|s| TradeOutcome::parse(&s)),
                actual_pnl: row.get(10)?,
            })
        })?;

        trades.collect::<Result<Vec<_>, _>>().map_err(|e| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn trade(id: &str, market_id: &str, size: f64, status: TradeStatus) -> Trade {
        Trade {
            trade_id: id.to_string(),
            market_id: market_id.to_string(),
            side: Side::Yes,
            price: 0.40,
            size,
            model_probability: 0.62,
            edge: 0.22,
            timestamp: Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).unwrap(),
            status,
            outcome: None,
            actual_pnl: None,
        }
    }

    #[test]
    fn test_insert_and_open_position_size() {
        let journal = TradeJournal::in_memory().unwrap();
        journal
            .insert_trade(&trade("t1", "m1", 10.0, TradeStatus::Filled))
            .unwrap();
        journal
            .insert_trade(&trade("t2", "m1", 5.0, TradeStatus::Pending))
            .unwrap();
        journal
            .insert_trade(&trade("t3", "m2", 7.0, TradeStatus::Filled))
            .unwrap();

        assert_eq!(journal.open_position_size("m1").unwrap(), 15.0);
        assert_eq!(journal.open_position_size("m2").unwrap(), 7.0);
        assert_eq!(journal.open_position_size("none").unwrap(), 0.0);
    }

    #[test]
    fn test_resolution_removes_open_exposure() {
        let journal = TradeJournal::in_memory().unwrap();
        journal
            .insert_trade(&trade("t1", "m1", 10.0, TradeStatus::Filled))
            .unwrap();
        assert!(journal.has_open_trade("m1").unwrap());

        journal
            .update_trade_resolution("t1", TradeOutcome::Won, 15.0)
            .unwrap();
        assert!(!journal.has_open_trade("m1").unwrap());
        assert_eq!(journal.open_position_size("m1").unwrap(), 0.0);
    }

    #[test]
    fn test_daily_pnl_sums_resolved_trades() {
        let journal = TradeJournal::in_memory().unwrap();
        journal
            .insert_trade(&trade("t1", "m1", 10.0, TradeStatus::Filled))
            .unwrap();
        journal
            .insert_trade(&trade("t2", "m2", 10.0, TradeStatus::Filled))
            .unwrap();
        journal
            .update_trade_resolution("t1", TradeOutcome::Won, 15.0)
            .unwrap();
        journal
            .update_trade_resolution("t2", TradeOutcome::Lost, -10.0)
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        assert_eq!(journal.daily_pnl(date).unwrap(), 5.0);
    }

    #[test]
    fn test_open_trades_round_trip() {
        let journal = TradeJournal::in_memory().unwrap();
        journal
            .insert_trade(&trade("t1", "m1", 10.0, TradeStatus::Pending))
            .unwrap();

        let open = journal.open_trades().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].trade_id, "t1");
        assert_eq!(open[0].status, TradeStatus::Pending);
        assert_eq!(open[0].side, Side::Yes);
    }

    #[test]
    fn test_status_update_closes_position() {
        let journal = TradeJournal::in_memory().unwrap();
        journal
            .insert_trade(&trade("t1", "m1", 10.0, TradeStatus::Pending))
            .unwrap();
        assert!(journal.has_open_trade("m1").unwrap());

        journal
            .update_trade_status("t1", TradeStatus::Cancelled)
            .unwrap();
        assert!(!journal.has_open_trade("m1").unwrap());
        assert!(journal.open_trades().unwrap().is_empty());
    }

    #[test]
    fn test_market_metadata_round_trip() {
        let journal = TradeJournal::in_memory().unwrap();
        let market = crate::data::types::WeatherMarket {
            market_id: "m1".to_string(),
            token_id: "m1-tok".to_string(),
            question: "Will the high in Denver exceed 50?".to_string(),
            location: "Denver".to_string(),
            lat: 39.7392,
            lon: -104.9903,
            event_date: NaiveDate::from_ymd_opt(2026, 2, 17).unwrap(),
            metric: crate::data::types::Metric::TemperatureHigh,
            threshold: 50.0,
            comparison: crate::data::types::Comparison::Above,
            yes_price: 0.40,
            no_price: 0.60,
            volume: 5000.0,
            close_date: Utc.with_ymd_and_hms(2026, 2, 17, 23, 0, 0).unwrap(),
            created_at: None,
        };
        journal.cache_market(&market, Utc::now()).unwrap();

        let (location, question) = journal.market_metadata("m1").unwrap().unwrap();
        assert_eq!(location, "Denver");
        assert_eq!(question, "Will the high in Denver exceed 50?");
        assert!(journal.market_metadata("missing").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_upsert() {
        let journal = TradeJournal::in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        journal
            .save_daily_snapshot(date, 500.0, 510.0, 10.0, 3)
            .unwrap();
        journal
            .save_daily_snapshot(date, 500.0, 505.0, 5.0, 4)
            .unwrap();

        let ending: f64 = journal
            .conn
            .query_row(
                "SELECT ending_balance FROM daily_snapshots WHERE date = '2026-02-17'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(ending, 505.0);
    }
}
