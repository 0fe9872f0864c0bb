//! Mechanical close rules: emergency loss, profit target and time stop.
//!
//! Evaluated before the decision engine sees a position; a position that
//! trips a rule is closed without asking.

use std::fmt;

use chrono::NaiveDate;
use optdesk_core::{ManagementConfig, Position};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    EmergencyLoss,
    ProfitTarget,
    TimeStop,
    EngineDecision,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmergencyLoss => write!(f, "emergency_loss"),
            Self::ProfitTarget => write!(f, "profit_target"),
            Self::TimeStop => write!(f, "time_stop"),
            Self::EngineDecision => write!(f, "engine_decision"),
        }
    }
}

fn fraction(part: Decimal, whole: Decimal) -> f64 {
    if whole.is_zero() {
        return 0.0;
    }
    (part / whole).to_f64().unwrap_or(0.0)
}

/// Checks every rule against a position. Returns the first that fires.
///
/// Positions without a mark are never closed by a rule.
#[must_use]
pub fn check_close_rules(
    position: &Position,
    config: &ManagementConfig,
    today: NaiveDate,
) -> Option<CloseReason> {
    let pnl = position.unrealized_pnl()?;

    // 1. Emergency: loss has eaten most of the defined risk
    if pnl < Decimal::ZERO {
        let loss_share = fraction(-pnl, position.max_loss());
        if loss_share >= config.emergency_loss_pct {
            tracing::warn!(
                position_id = %position.id,
                symbol = %position.symbol,
                pnl = %pnl,
                loss_share,
                "Emergency loss rule triggered"
            );
            return Some(CloseReason::EmergencyLoss);
        }
    }

    // 2. Profit target: most of the available premium captured
    if pnl > Decimal::ZERO {
        let profit_share = fraction(pnl, position.max_profit());
        if profit_share >= config.profit_target_pct {
            tracing::info!(
                position_id = %position.id,
                symbol = %position.symbol,
                pnl = %pnl,
                profit_share,
                "Profit target hit"
            );
            return Some(CloseReason::ProfitTarget);
        }
    }

    // 3. Time stop: losing position close to expiry
    let dte = position.days_to_expiry(today);
    if dte <= config.time_stop_dte && pnl < Decimal::ZERO {
        tracing::warn!(
            position_id = %position.id,
            symbol = %position.symbol,
            dte,
            pnl = %pnl,
            "Time stop triggered"
        );
        return Some(CloseReason::TimeStop);
    }

    None
}
