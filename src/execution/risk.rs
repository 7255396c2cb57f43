use tracing::warn;

/// Outcome of one hard limit check. The reason string is surfaced to
/// operators deciding whether to relax a limit, so it carries the
/// numbers that tripped it.
#[derive(Debug, Clone)]
pub struct LimitCheck {
    pub allowed: bool,
    pub reason: String,
}

impl LimitCheck {
    fn ok() -> Self {
        Self {
            allowed: true,
            reason: "OK".to_string(),
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// A single position must not exceed the per-position cap. Callers cap
/// the size to the limit on failure rather than discarding the signal.
pub fn check_position_limit(trade_size: f64, bankroll: f64, cap_pct: f64) -> LimitCheck {
    let max_position = bankroll * cap_pct;
    if trade_size > max_position {
        warn!(trade_size, max_position, "position limit exceeded");
        return LimitCheck::denied(format!(
            "Trade size ${trade_size:.2} exceeds position cap ${max_position:.2} \
             ({:.0}% of ${bankroll:.2})",
            cap_pct * 100.0
        ));
    }
    LimitCheck::ok()
}

/// Sufficient cash for the pending trade, and the portfolio has not
/// grown past the ceiling. Buying converts cash to exposure without
/// changing total value; the ceiling only stops reinvesting gains.
pub fn check_bankroll_limit(
    cash: f64,
    pending: f64,
    total_value: f64,
    max_bankroll: f64,
) -> LimitCheck {
    if pending > cash {
        warn!(cash, pending, "insufficient cash");
        return LimitCheck::denied(format!(
            "Insufficient cash: ${cash:.2} available, ${pending:.2} required"
        ));
    }
    if total_value > max_bankroll {
        warn!(total_value, max_bankroll, "bankroll ceiling exceeded");
        return LimitCheck::denied(format!(
            "Portfolio value ${total_value:.2} exceeds max bankroll ${max_bankroll:.2}, \
             halt reinvestment of gains"
        ));
    }
    LimitCheck::ok()
}

/// Daily losses at or past the limit block trading for the rest of the day.
pub fn check_daily_loss(daily_pnl: f64, starting_bankroll: f64, limit_pct: f64) -> LimitCheck {
    let max_loss = starting_bankroll * limit_pct;
    if daily_pnl < 0.0 && daily_pnl.abs() >= max_loss {
        warn!(daily_pnl, max_loss, "daily loss limit hit");
        return LimitCheck::denied(format!(
            "Daily loss ${daily_pnl:.2} exceeds limit -${max_loss:.2} \
             ({:.0}% of ${starting_bankroll:.2})",
            limit_pct * 100.0
        ));
    }
    LimitCheck::ok()
}

/// Manual global override. Checked first in every entry point.
pub fn check_kill_switch(kill_switch: bool) -> LimitCheck {
    if kill_switch {
        warn!("kill switch engaged");
        return LimitCheck::denied("Kill switch is engaged, all trading halted".to_string());
    }
    LimitCheck::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_within_limit() {
        let check = check_position_limit(20.0, 500.0, 0.05);
        assert!(check.allowed);
        assert_eq!(check.reason, "OK");
    }

    #[test]
    fn test_position_over_limit() {
        let check = check_position_limit(30.0, 500.0, 0.05);
        assert!(!check.allowed);
        assert!(check.reason.contains("position cap"));
    }

    #[test]
    fn test_position_exactly_at_limit_allowed() {
        let check = check_position_limit(25.0, 500.0, 0.05);
        assert!(check.allowed);
    }

    #[test]
    fn test_bankroll_sufficient() {
        assert!(check_bankroll_limit(100.0, 50.0, 400.0, 500.0).allowed);
    }

    #[test]
    fn test_bankroll_insufficient_cash() {
        let check = check_bankroll_limit(10.0, 50.0, 400.0, 500.0);
        assert!(!check.allowed);
        assert!(check.reason.contains("Insufficient cash"));
    }

    #[test]
    fn test_bankroll_ceiling_halts_reinvestment() {
        let check = check_bankroll_limit(600.0, 50.0, 650.0, 500.0);
        assert!(!check.allowed);
        assert!(check.reason.contains("max bankroll"));
    }

    #[test]
    fn test_daily_loss_under_limit() {
        assert!(check_daily_loss(-20.0, 500.0, 0.05).allowed);
    }

    #[test]
    fn test_daily_loss_at_limit_blocked() {
        // -26 on a 500 starting bankroll with 5% limit (25)
        let check = check_daily_loss(-26.0, 500.0, 0.05);
        assert!(!check.allowed);
        assert!(check.reason.contains("Daily loss"));
    }

    #[test]
    fn test_daily_loss_exactly_at_limit_blocked() {
        assert!(!check_daily_loss(-25.0, 500.0, 0.05).allowed);
    }

    #[test]
    fn test_daily_profit_never_blocks() {
        assert!(check_daily_loss(100.0, 500.0, 0.05).allowed);
    }

    #[test]
    fn test_kill_switch() {
        assert!(check_kill_switch(false).allowed);
        let check = check_kill_switch(true);
        assert!(!check.allowed);
        assert!(check.reason.contains("Kill switch"));
    }
}
