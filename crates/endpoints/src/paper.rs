//! In-memory paper broker.
//!
//! Fills every limit order at its limit price and tracks cash and open
//! spreads locally. Useful for running the full pipeline without a live
//! account, and as the default provider.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use optdesk_core::position::max_loss;
use optdesk_core::{
    AccountSummary, BrokerEndpoint, BrokerPosition, ExternalError, ExternalResult, OrderIntent,
    OrderRequest, OrderResult, OrderStatus, PositionId, CONTRACT_MULTIPLIER,
};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

const DEFAULT_IMPLIED_VOL: f64 = 0.20;

#[derive(Debug, Clone, Copy)]
struct Quote {
    underlying_price: f64,
    implied_vol: f64,
}

#[derive(Debug)]
struct Book {
    cash: Decimal,
    positions: BTreeMap<PositionId, BrokerPosition>,
    quotes: HashMap<String, Quote>,
}

impl Book {
    fn reserved(&self) -> Decimal {
        self.positions
            .values()
            .map(|p| max_loss(p.strategy, &p.legs, p.entry_price, p.quantity))
            .sum()
    }

    fn open_value(&self) -> Decimal {
        self.positions
            .values()
            .map(|p| {
                let value = p.mark * CONTRACT_MULTIPLIER * Decimal::from(p.quantity);
                if p.strategy.is_credit() {
                    -value
                } else {
                    value
                }
            })
            .sum()
    }
}

pub struct PaperBroker {
    account_id: String,
    book: Mutex<Book>,
    available: AtomicBool,
    sequence: AtomicU64,
}

impl PaperBroker {
    #[must_use]
    pub fn new(account_id: impl Into<String>, starting_cash: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            book: Mutex::new(Book {
                cash: starting_cash,
                positions: BTreeMap::new(),
                quotes: HashMap::new(),
            }),
            available: AtomicBool::new(true),
            sequence: AtomicU64::new(0),
        }
    }

    /// Simulates an outage: while unavailable every call fails with a
    /// transport error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Sets the underlying quote used for positions in `symbol`.
    pub fn set_quote(&self, symbol: &str, underlying_price: f64, implied_vol: f64) {
        let quote = Quote {
            underlying_price,
            implied_vol,
        };
        let mut book = self.book.lock();
        book.quotes.insert(symbol.to_string(), quote);
        for position in book.positions.values_mut().filter(|p| p.symbol == symbol) {
            position.underlying_price = underlying_price;
            position.implied_vol = implied_vol;
        }
    }

    /// Overrides the mark of an open position. Returns false if unknown.
    pub fn set_mark(&self, id: &PositionId, mark: Decimal) -> bool {
        match self.book.lock().positions.get_mut(id) {
            Some(position) => {
                position.mark = mark;
                true
            }
            None => false,
        }
    }

    /// Inserts an already-open position, as if it predated this session.
    pub fn seed_position(&self, position: BrokerPosition) {
        self.book
            .lock()
            .positions
            .insert(position.position_id.clone(), position);
    }

    #[must_use]
    pub fn open_positions(&self) -> usize {
        self.book.lock().positions.len()
    }

    fn ensure_available(&self) -> ExternalResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ExternalError::Transport(format!(
                "paper account {} unavailable",
                self.account_id
            )))
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{}-{seq}", Utc::now().timestamp_millis())
    }

    fn fill(&self, order: &OrderRequest, position_id: PositionId) -> OrderResult {
        OrderResult {
            order_id: self.next_id("PAPER"),
            status: OrderStatus::Filled,
            filled_quantity: order.quantity,
            fill_price: Some(order.limit_price),
            position_id: Some(position_id),
            message: None,
            timestamp: Utc::now(),
        }
    }

    fn reject(&self, reason: String) -> OrderResult {
        OrderResult {
            order_id: self.next_id("PAPER"),
            status: OrderStatus::Rejected,
            filled_quantity: 0,
            fill_price: None,
            position_id: None,
            message: Some(reason),
            timestamp: Utc::now(),
        }
    }

    fn open(&self, order: &OrderRequest) -> OrderResult {
        let mut book = self.book.lock();
        let required = max_loss(order.strategy, &order.legs, order.limit_price, order.quantity);
        let buying_power = book.cash - book.reserved();
        if required > buying_power {
            return self.reject(format!(
                "insufficient buying power: need {required}, have {buying_power}"
            ));
        }

        let quote = book.quotes.get(&order.symbol).copied().unwrap_or_else(|| Quote {
            underlying_price: mean_strike(order),
            implied_vol: DEFAULT_IMPLIED_VOL,
        });
        let premium = order.limit_price * CONTRACT_MULTIPLIER * Decimal::from(order.quantity);
        if order.strategy.is_credit() {
            book.cash += premium;
        } else {
            book.cash -= premium;
        }

        let position_id = PositionId::new(self.next_id("PAPER-POS"));
        book.positions.insert(
            position_id.clone(),
            BrokerPosition {
                position_id: position_id.clone(),
                symbol: order.symbol.clone(),
                strategy: order.strategy,
                legs: order.legs.clone(),
                quantity: order.quantity,
                entry_price: order.limit_price,
                opened_at: Utc::now(),
                mark: order.limit_price,
                underlying_price: quote.underlying_price,
                implied_vol: quote.implied_vol,
            },
        );
        drop(book);

        let result = self.fill(order, position_id);
        info!(
            order_id = %result.order_id,
            symbol = %order.symbol,
            strategy = %order.strategy.as_str(),
            price = %order.limit_price,
            quantity = order.quantity,
            "Paper open filled"
        );
        result
    }

    fn close(&self, order: &OrderRequest) -> OrderResult {
        let Some(id) = order.position_id.clone() else {
            return self.reject("close order without position id".to_string());
        };
        let mut book = self.book.lock();
        let Some(position) = book.positions.remove(&id) else {
            return self.reject(format!("unknown position {id}"));
        };

        let premium = order.limit_price * CONTRACT_MULTIPLIER * Decimal::from(position.quantity);
        if position.strategy.is_credit() {
            book.cash -= premium;
        } else {
            book.cash += premium;
        }
        drop(book);

        let result = self.fill(order, id.clone());
        info!(
            order_id = %result.order_id,
            position_id = %id,
            price = %order.limit_price,
            "Paper close filled"
        );
        result
    }
}

fn mean_strike(order: &OrderRequest) -> f64 {
    if order.legs.is_empty() {
        return 0.0;
    }
    let total: Decimal = order.legs.iter().map(|l| l.strike).sum();
    (total / Decimal::from(order.legs.len()))
        .to_f64()
        .unwrap_or(0.0)
}

#[async_trait]
impl BrokerEndpoint for PaperBroker {
    async fn get_positions(&self) -> ExternalResult<Vec<BrokerPosition>> {
        self.ensure_available()?;
        Ok(self.book.lock().positions.values().cloned().collect())
    }

    async fn get_account(&self) -> ExternalResult<AccountSummary> {
        self.ensure_available()?;
        let book = self.book.lock();
        Ok(AccountSummary {
            account_id: self.account_id.clone(),
            cash: book.cash,
            buying_power: book.cash - book.reserved(),
            net_liquidation: book.cash + book.open_value(),
        })
    }

    async fn submit_order(&self, order: OrderRequest) -> ExternalResult<OrderResult> {
        self.ensure_available()?;
        if order.quantity == 0 {
            return Err(ExternalError::Rejected("quantity must be positive".into()));
        }
        Ok(match order.intent {
            OrderIntent::Open => self.open(&order),
            OrderIntent::Close => self.close(&order),
        })
    }
}

impl std::fmt::Debug for PaperBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperBroker")
            .field("account_id", &self.account_id)
            .field("available", &self.available.load(Ordering::Relaxed))
            .field("open_positions", &self.open_positions())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use optdesk_core::{LegSide, OptionLeg, OptionRight, StrategyTag};
    use rust_decimal_macros::dec;

    fn put_credit_order(limit: Decimal, quantity: u32) -> OrderRequest {
        let expiry = NaiveDate::from_ymd_opt(2026, 11, 20).unwrap();
        OrderRequest {
            client_order_id: "open-1".to_string(),
            symbol: "SPY".to_string(),
            strategy: StrategyTag::PutCreditSpread,
            legs: vec![
                OptionLeg {
                    right: OptionRight::Put,
                    side: LegSide::Short,
                    strike: dec!(450),
                    expiry,
                },
                OptionLeg {
                    right: OptionRight::Put,
                    side: LegSide::Long,
                    strike: dec!(445),
                    expiry,
                },
            ],
            quantity,
            limit_price: limit,
            intent: OrderIntent::Open,
            position_id: None,
        }
    }

    #[tokio::test]
    async fn test_open_then_close_credit_spread() {
        let broker = PaperBroker::new("paper", dec!(10000));
        broker.set_quote("SPY", 462.0, 0.18);

        let opened = broker.submit_order(put_credit_order(dec!(1.50), 2)).await.unwrap();
        assert!(opened.is_filled());
        assert_eq!(opened.fill_price, Some(dec!(1.50)));
        assert!(opened.order_id.starts_with("PAPER-"));

        let account = broker.get_account().await.unwrap();
        assert_eq!(account.cash, dec!(10300));
        assert_eq!(account.buying_power, dec!(9600));

        let positions = broker.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert!((positions[0].underlying_price - 462.0).abs() < f64::EPSILON);

        let mut close = put_credit_order(dec!(0.50), 2);
        close.intent = OrderIntent::Close;
        close.position_id = opened.position_id.clone();
        let closed = broker.submit_order(close).await.unwrap();
        assert!(closed.is_filled());
        assert_eq!(broker.get_account().await.unwrap().cash, dec!(10200));
        assert_eq!(broker.open_positions(), 0);
    }

    #[tokio::test]
    async fn test_rejects_when_buying_power_short() {
        let broker = PaperBroker::new("paper", dec!(500));
        let result = broker.submit_order(put_credit_order(dec!(1.00), 2)).await.unwrap();
        assert_eq!(result.status, OrderStatus::Rejected);
        assert!(result.message.unwrap().contains("buying power"));
        assert_eq!(broker.open_positions(), 0);
    }

    #[tokio::test]
    async fn test_close_unknown_position_is_rejected() {
        let broker = PaperBroker::new("paper", dec!(10000));
        let mut close = put_credit_order(dec!(0.50), 1);
        close.intent = OrderIntent::Close;
        close.position_id = Some(PositionId::new("missing"));
        let result = broker.submit_order(close).await.unwrap();
        assert_eq!(result.status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let broker = PaperBroker::new("paper", dec!(10000));
        broker.set_available(false);
        assert!(matches!(broker.get_account().await, Err(ExternalError::Transport(_))));
        assert!(broker.get_positions().await.unwrap_err().is_transient());

        broker.set_available(true);
        assert!(broker.get_account().await.is_ok());
    }

    #[tokio::test]
    async fn test_marks_feed_net_liquidation() {
        let broker = PaperBroker::new("paper", dec!(10000));
        let opened = broker.submit_order(put_credit_order(dec!(1.50), 1)).await.unwrap();
        let id = opened.position_id.unwrap();

        assert!(broker.set_mark(&id, dec!(2.50)));
        let account = broker.get_account().await.unwrap();
        // cash 10150, short spread worth 250
        assert_eq!(account.net_liquidation, dec!(9900));
        assert!(!broker.set_mark(&PositionId::new("missing"), dec!(1)));
    }
}
