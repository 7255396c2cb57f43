use anyhow::Result;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;

use crate::execution::types::Trade;

pub struct CsvLogger {
    log_path: String,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        // Create CSV file with headers if it doesn't exist
        if !std::path::Path::new(&log_path).exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)?;

            writeln!(
                file,
                "timestamp,trade_id,market_id,side,price,size,model_probability,edge,status,pnl"
            )?;
        }

        Ok(Self { log_path })
    }

    /// Append one trade row
    pub fn log_trade(&self, trade: &Trade) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        let pnl_str = match trade.actual_pnl {
            Some(pnl) => format!("{:.2}", pnl),
            None => "".to_string(),
        };

        writeln!(
            file,
            "{},{},{},{},{:.3},{:.2},{:.4},{:.4},{},{}",
            trade.timestamp.to_rfc3339(),
            trade.trade_id,
            trade.market_id,
            trade.side.as_str(),
            trade.price,
            trade.size,
            trade.model_probability,
            trade.edge,
            trade.status.as_str(),
            pnl_str
        )?;

        Ok(())
    }

    /// Log a free-form event (halts, resolutions) into the same file
    pub fn log_event(&self, event: &str) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        writeln!(file, "{},EVENT,{},,,,,,,", Utc::now().to_rfc3339(), event)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::types::TradeStatus;
    use crate::strategies::types::Side;
    use chrono::TimeZone;

    #[test]
    fn test_header_then_rows() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("wv-log-{}.csv", std::process::id()));
        let path_str = path.to_str().unwrap().to_string();
        let _ = std::fs::remove_file(&path);

        let logger = CsvLogger::new(path_str.clone()).unwrap();
        logger
            .log_trade(&Trade {
                trade_id: "abc123def456".to_string(),
                market_id: "m1".to_string(),
                side: Side::Yes,
                price: 0.40,
                size: 20.0,
                model_probability: 0.62,
                edge: 0.22,
                timestamp: Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).unwrap(),
                status: TradeStatus::Filled,
                outcome: None,
                actual_pnl: None,
            })
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("timestamp,trade_id"));
        assert!(lines[1].contains("abc123def456"));
        assert!(lines[1].contains("YES"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_event_row_keeps_column_count() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("wv-events-{}.csv", std::process::id()));
        let path_str = path.to_str().unwrap().to_string();
        let _ = std::fs::remove_file(&path);

        let logger = CsvLogger::new(path_str).unwrap();
        logger.log_event("daily loss limit reached").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(",EVENT,daily loss limit reached"));
        // Same column count as a trade row
        assert_eq!(lines[1].matches(',').count(), lines[0].matches(',').count());

        std::fs::remove_file(&path).unwrap();
    }
}
