use rust_decimal::Decimal;

use super::price_oracle::{last_price_within, normalize_symbol};
use crate::{
    error::{TradingError, TradingResult},
    models::{AutoTradeRule, Condition, Side, Transaction},
    AppState,
};

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub limit_price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub enum OrderOutcome {
    Executed(Transaction),
    RulePlaced(AutoTradeRule),
}

/// Places an order for the user.
///
/// A BUY with a limit price becomes a standing `price < limit` rule that the
/// scanner fills later. A SELL with a price fills right away at that price.
/// Anything else fills right away at the oracle's last price. Rejections are
/// returned to the caller as-is.
pub async fn place_order(state: &AppState, req: OrderRequest) -> TradingResult<OrderOutcome> {
    let user = req.user_id.trim();
    if user.is_empty() {
        return Err(TradingError::InvalidOrder("missing user id".to_string()));
    }
    let sym = normalize_symbol(&req.symbol);
    if sym.is_empty() {
        return Err(TradingError::InvalidOrder("missing symbol".to_string()));
    }
    if req.quantity <= 0 {
        return Err(TradingError::InvalidOrder("quantity must be positive".to_string()));
    }

    if let Some(limit) = req.limit_price {
        if limit <= Decimal::ZERO {
            return Err(TradingError::InvalidOrder("limit price must be positive".to_string()));
        }
    }

    let price = match (req.side, req.limit_price) {
        (Side::Buy, Some(limit)) => {
            let rule = state
                .rules
                .add_rule(user, &sym, Condition::below(limit), Side::Buy, req.quantity)
                .await?;
            return Ok(OrderOutcome::RulePlaced(rule));
        }
        (Side::Sell, Some(limit)) => limit,
        (_, None) => last_price_within(state.oracle.as_ref(), &sym, state.settings.price_timeout)
            .await
            .into_result(&sym)?,
    };

    let portfolio = state.store.get_or_create_portfolio(user).await?;

    let txn = state
        .executor
        .execute(portfolio.id, &sym, req.side, req.quantity, price)
        .await?;

    Ok(OrderOutcome::Executed(txn))
}
