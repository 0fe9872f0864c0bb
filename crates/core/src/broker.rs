//! Broker-facing request and response types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::position::{OptionLeg, Position, PositionId, PositionValuation, ProviderId};
use crate::strategy::StrategyTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_id: String,
    pub cash: Decimal,
    pub buying_power: Decimal,
    pub net_liquidation: Decimal,
}

/// A position as reported by a broker, including its current marks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub position_id: PositionId,
    pub symbol: String,
    pub strategy: StrategyTag,
    pub legs: Vec<OptionLeg>,
    pub quantity: u32,
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub mark: Decimal,
    pub underlying_price: f64,
    pub implied_vol: f64,
}

impl BrokerPosition {
    #[must_use]
    pub fn valuation(&self, as_of: DateTime<Utc>) -> PositionValuation {
        PositionValuation {
            mark: self.mark,
            underlying_price: self.underlying_price,
            implied_vol: self.implied_vol,
            as_of,
        }
    }

    /// Converts into a tracked position owned by `provider`.
    #[must_use]
    pub fn into_position(self, provider: ProviderId, as_of: DateTime<Utc>) -> Position {
        let valuation = Some(self.valuation(as_of));
        Position {
            id: self.position_id,
            provider,
            symbol: self.symbol,
            strategy: self.strategy,
            legs: self.legs,
            quantity: self.quantity,
            entry_price: self.entry_price,
            opened_at: self.opened_at,
            valuation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderIntent {
    Open,
    Close,
}

/// A limit order for one spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub strategy: StrategyTag,
    pub legs: Vec<OptionLeg>,
    pub quantity: u32,
    /// Net premium per spread unit.
    pub limit_price: Decimal,
    pub intent: OrderIntent,
    /// Set when closing; identifies the position being closed.
    pub position_id: Option<PositionId>,
}

impl OrderRequest {
    /// Builds the order that closes `position` at `limit_price`.
    #[must_use]
    pub fn closing(position: &Position, limit_price: Decimal) -> Self {
        Self {
            client_order_id: format!("close-{}", position.id),
            symbol: position.symbol.clone(),
            strategy: position.strategy,
            legs: position.legs.clone(),
            quantity: position.quantity,
            limit_price,
            intent: OrderIntent::Close,
            position_id: Some(position.id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Filled,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_quantity: u32,
    pub fill_price: Option<Decimal>,
    /// Broker-side id of the position opened or closed by this order.
    pub position_id: Option<PositionId>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OrderResult {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled && self.filled_quantity > 0
    }
}
