use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use tokio::sync::broadcast;

use super::{
    price_oracle::normalize_symbol,
    store::{HoldingChange, TradeCommit, TradingStore},
};
use crate::{
    error::{TradingError, TradingResult},
    models::{AutoTradeRule, Holding, Portfolio, Side, Transaction},
};

const MAX_COMMIT_ATTEMPTS: usize = 3;

/// One async mutex per portfolio id. Different portfolios never contend.
#[derive(Default)]
struct PortfolioLocks {
    inner: Mutex<HashMap<ObjectId, Arc<tokio::sync::Mutex<()>>>>,
}

impl PortfolioLocks {
    fn for_portfolio(&self, id: ObjectId) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(id).or_default().clone()
    }
}

/// Balance and holding state after a fill, computed from the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct FillPlan {
    pub new_balance: Decimal,
    pub holding: HoldingChange,
    pub total: Decimal,
}

fn overflow(what: &str) -> TradingError {
    TradingError::InvalidOrder(format!("{what} out of range"))
}

/// Applies BUY/SELL rules to a portfolio snapshot without touching storage.
pub fn plan_fill(
    portfolio: &Portfolio,
    holding: Option<&Holding>,
    symbol: &str,
    side: Side,
    quantity: i64,
    price: Decimal,
    now: i64,
) -> TradingResult<FillPlan> {
    let total = price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| overflow("order total"))?;

    match side {
        Side::Buy => {
            if total > portfolio.balance {
                return Err(TradingError::InsufficientFunds {
                    required: total,
                    available: portfolio.balance,
                });
            }

            let next = match holding {
                Some(h) => {
                    let new_qty = h
                        .quantity
                        .checked_add(quantity)
                        .ok_or_else(|| overflow("holding quantity"))?;
                    let average_price = h
                        .average_price
                        .checked_mul(Decimal::from(h.quantity))
                        .and_then(|basis| basis.checked_add(total))
                        .and_then(|basis| basis.checked_div(Decimal::from(new_qty)))
                        .ok_or_else(|| overflow("average price"))?;
                    Holding {
                        quantity: new_qty,
                        average_price,
                        updated_at: now,
                        ..h.clone()
                    }
                }
                None => Holding {
                    id: ObjectId::new(),
                    portfolio_id: portfolio.id,
                    symbol: symbol.to_string(),
                    quantity,
                    average_price: price,
                    updated_at: now,
                },
            };

            Ok(FillPlan {
                new_balance: portfolio.balance - total,
                holding: HoldingChange::Upsert(next),
                total,
            })
        }
        Side::Sell => {
            let Some(h) = holding else {
                return Err(TradingError::NoSuchHolding {
                    symbol: symbol.to_string(),
                });
            };

            if h.quantity < quantity {
                return Err(TradingError::InsufficientHoldings {
                    symbol: symbol.to_string(),
                    requested: quantity,
                    held: h.quantity,
                });
            }

            let remaining = h.quantity - quantity;
            let change = if remaining == 0 {
                HoldingChange::Delete(h.id)
            } else {
                HoldingChange::Upsert(Holding {
                    quantity: remaining,
                    updated_at: now,
                    ..h.clone()
                })
            };

            let new_balance = portfolio
                .balance
                .checked_add(total)
                .ok_or_else(|| overflow("balance"))?;

            Ok(FillPlan {
                new_balance,
                holding: change,
                total,
            })
        }
    }
}

#[derive(Clone)]
pub struct OrderExecutor {
    store: Arc<dyn TradingStore>,
    locks: Arc<PortfolioLocks>,
    events_tx: broadcast::Sender<String>,
}

impl OrderExecutor {
    pub fn new(store: Arc<dyn TradingStore>, events_tx: broadcast::Sender<String>) -> Self {
        Self {
            store,
            locks: Arc::new(PortfolioLocks::default()),
            events_tx,
        }
    }

    /// Executes one fill against the portfolio. Balance, holding and
    /// transaction are committed together or not at all.
    pub async fn execute(
        &self,
        portfolio_id: ObjectId,
        symbol: &str,
        side: Side,
        quantity: i64,
        price: Decimal,
    ) -> TradingResult<Transaction> {
        self.execute_inner(portfolio_id, symbol, side, quantity, price, None)
            .await
    }

    /// Fills a triggered rule for its owner and consumes the rule in the same commit.
    pub async fn execute_rule(&self, rule: &AutoTradeRule, price: Decimal) -> TradingResult<Transaction> {
        let portfolio = self.store.get_or_create_portfolio(&rule.user_id).await?;
        self.execute_inner(
            portfolio.id,
            &rule.symbol,
            rule.action,
            rule.quantity,
            price,
            Some(rule.id),
        )
        .await
    }

    async fn execute_inner(
        &self,
        portfolio_id: ObjectId,
        symbol: &str,
        side: Side,
        quantity: i64,
        price: Decimal,
        rule_id: Option<ObjectId>,
    ) -> TradingResult<Transaction> {
        let sym = normalize_symbol(symbol);
        if sym.is_empty() {
            return Err(TradingError::InvalidOrder("missing symbol".to_string()));
        }
        if quantity <= 0 {
            return Err(TradingError::InvalidOrder("quantity must be positive".to_string()));
        }
        if price <= Decimal::ZERO {
            return Err(TradingError::InvalidOrder("price must be positive".to_string()));
        }

        let lock = self.locks.for_portfolio(portfolio_id);
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let portfolio = self.store.get_portfolio(portfolio_id).await?;
            let holding = self.store.get_holding(portfolio_id, &sym).await?;
            let now = Utc::now().timestamp_millis();

            let plan = plan_fill(&portfolio, holding.as_ref(), &sym, side, quantity, price, now)?;

            let txn = Transaction {
                id: ObjectId::new(),
                portfolio_id,
                symbol: sym.clone(),
                side,
                quantity,
                price,
                total: plan.total,
                rule_id,
                timestamp: now,
            };

            let commit = TradeCommit {
                portfolio_id,
                expected_version: portfolio.version,
                new_balance: plan.new_balance,
                holding: plan.holding,
                transaction: txn.clone(),
                consume_rule: rule_id,
                now,
            };

            match self.store.commit_trade(commit).await {
                Ok(()) => {
                    tracing::info!(
                        portfolio = %portfolio_id,
                        symbol = %sym,
                        side = %side,
                        quantity,
                        price = %price,
                        balance = %plan.new_balance,
                        rule = ?rule_id.map(|r| r.to_hex()),
                        "order filled"
                    );

                    // broadcast so open pages refresh
                    let _ = self.events_tx.send("ordersUpdated".to_string());
                    let _ = self.events_tx.send("positionUpdated".to_string());
                    let _ = self.events_tx.send("cashUpdated".to_string());

                    return Ok(txn);
                }
                // another process moved the portfolio between read and commit
                Err(TradingError::ConcurrentModification(id)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::debug!(portfolio = %id, attempt, "commit conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
