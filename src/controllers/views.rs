use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{AutoTradeRule, Side, Transaction};

// ObjectIds are rendered as hex strings in every API body.

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: Side,
    pub quantity: i64,
    pub price: Decimal,
    pub total: Decimal,
    pub rule_id: Option<String>,
    pub timestamp: i64,
}

impl From<&Transaction> for TransactionView {
    fn from(t: &Transaction) -> Self {
        Self {
            id: t.id.to_hex(),
            symbol: t.symbol.clone(),
            side: t.side,
            quantity: t.quantity,
            price: t.price,
            total: t.total,
            rule_id: t.rule_id.map(|r| r.to_hex()),
            timestamp: t.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub condition: String,
    pub threshold: Decimal,
    pub action: Side,
    pub quantity: i64,
    pub active: bool,
    pub created_at: i64,
    pub executed_at: Option<i64>,
}

impl From<&AutoTradeRule> for RuleView {
    fn from(r: &AutoTradeRule) -> Self {
        Self {
            id: r.id.to_hex(),
            user_id: r.user_id.clone(),
            symbol: r.symbol.clone(),
            condition: r.condition.to_string(),
            threshold: r.condition.threshold,
            action: r.action,
            quantity: r.quantity,
            active: r.active,
            created_at: r.created_at,
            executed_at: r.executed_at,
        }
    }
}
