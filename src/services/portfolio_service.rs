use rust_decimal::Decimal;
use serde::Serialize;

use super::price_oracle::last_price_within;
use crate::{error::TradingResult, models::Side, AppState};

#[derive(Debug, Clone, Serialize)]
pub struct HoldingView {
    pub symbol: String,
    pub quantity: i64,
    pub avg_price: Decimal,
    // null when the oracle has no price right now
    pub current_price: Option<Decimal>,
    pub current_value: Decimal,
    pub pl: Decimal,
    pub pl_percent: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSnapshot {
    pub user_id: String,
    pub balance: Decimal,
    pub holdings: Vec<HoldingView>,
    pub total_value: Decimal,
    pub total_pl: Decimal,
    pub total_pl_percent: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    Pending,
    Executed,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: Side,
    pub quantity: i64,
    pub price: Decimal,
    pub timestamp: i64,
    pub status: EntryStatus,
}

fn percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole > Decimal::ZERO {
        (part / whole * Decimal::ONE_HUNDRED).round_dp(2)
    } else {
        Decimal::ZERO
    }
}

/// Balance, holdings at the last price and P/L against the starting balance.
/// A holding without a price is valued at its cost basis.
pub async fn snapshot(state: &AppState, user_id: &str) -> TradingResult<PortfolioSnapshot> {
    let portfolio = state.store.get_or_create_portfolio(user_id).await?;
    let holdings = state.store.list_holdings(portfolio.id).await?;

    let mut views: Vec<HoldingView> = vec![];
    let mut holdings_value = Decimal::ZERO;

    for h in holdings {
        let last = last_price_within(state.oracle.as_ref(), &h.symbol, state.settings.price_timeout)
            .await
            .price();

        let qty = Decimal::from(h.quantity);
        let invested = h.average_price * qty;
        let current_value = last.map(|p| p * qty).unwrap_or(invested);
        let pl = current_value - invested;

        holdings_value += current_value;
        views.push(HoldingView {
            symbol: h.symbol,
            quantity: h.quantity,
            avg_price: h.average_price,
            current_price: last,
            current_value,
            pl,
            pl_percent: percent(pl, invested),
        });
    }

    let total_value = portfolio.balance + holdings_value;
    let total_pl = total_value - state.settings.starting_balance;

    Ok(PortfolioSnapshot {
        user_id: portfolio.user_id,
        balance: portfolio.balance,
        holdings: views,
        total_value,
        total_pl,
        total_pl_percent: percent(total_pl, state.settings.starting_balance),
    })
}

/// Pending rules and executed fills, newest first.
pub async fn history(state: &AppState, user_id: &str) -> TradingResult<Vec<HistoryEntry>> {
    let portfolio = state.store.get_or_create_portfolio(user_id).await?;
    let txns = state.store.list_transactions(portfolio.id).await?;
    let pending = state.rules.list_active(Some(user_id)).await?;

    let mut out: Vec<HistoryEntry> = Vec::with_capacity(txns.len() + pending.len());

    out.extend(pending.into_iter().map(|r| HistoryEntry {
        id: format!("rule-{}", r.id.to_hex()),
        symbol: r.symbol,
        side: r.action,
        quantity: r.quantity,
        price: r.condition.threshold,
        timestamp: r.created_at,
        status: EntryStatus::Pending,
    }));

    out.extend(txns.into_iter().map(|t| HistoryEntry {
        id: format!("txn-{}", t.id.to_hex()),
        symbol: t.symbol,
        side: t.side,
        quantity: t.quantity,
        price: t.price,
        timestamp: t.timestamp,
        status: EntryStatus::Executed,
    }));

    // stable, so equal timestamps keep their listing order
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Ok(out)
}
