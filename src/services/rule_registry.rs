use std::sync::Arc;

use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use tokio::sync::broadcast;

use super::{
    price_oracle::normalize_symbol,
    store::{RuleFilter, TradingStore},
};
use crate::{
    error::{TradingError, TradingResult},
    models::{AutoTradeRule, Condition, Side},
};

/// A condition as handed over by a caller: raw text or already structured.
#[derive(Debug, Clone)]
pub enum ConditionInput {
    Text(String),
    Parsed(Condition),
}

impl ConditionInput {
    fn resolve(self) -> TradingResult<Condition> {
        match self {
            ConditionInput::Text(s) => s.parse::<Condition>(),
            ConditionInput::Parsed(c) if c.threshold > rust_decimal::Decimal::ZERO => Ok(c),
            ConditionInput::Parsed(c) => Err(TradingError::MalformedCondition {
                input: c.to_string(),
            }),
        }
    }
}

impl From<&str> for ConditionInput {
    fn from(s: &str) -> Self {
        ConditionInput::Text(s.to_string())
    }
}

impl From<String> for ConditionInput {
    fn from(s: String) -> Self {
        ConditionInput::Text(s)
    }
}

impl From<Condition> for ConditionInput {
    fn from(c: Condition) -> Self {
        ConditionInput::Parsed(c)
    }
}

#[derive(Clone)]
pub struct RuleRegistry {
    store: Arc<dyn TradingStore>,
    events_tx: broadcast::Sender<String>,
}

impl RuleRegistry {
    pub fn new(store: Arc<dyn TradingStore>, events_tx: broadcast::Sender<String>) -> Self {
        Self { store, events_tx }
    }

    pub async fn add_rule(
        &self,
        user_id: &str,
        symbol: &str,
        condition: impl Into<ConditionInput>,
        action: Side,
        quantity: i64,
    ) -> TradingResult<AutoTradeRule> {
        let user = user_id.trim();
        if user.is_empty() {
            return Err(TradingError::InvalidOrder("missing user id".to_string()));
        }
        let sym = normalize_symbol(symbol);
        if sym.is_empty() {
            return Err(TradingError::InvalidOrder("missing symbol".to_string()));
        }
        if quantity <= 0 {
            return Err(TradingError::InvalidOrder("quantity must be positive".to_string()));
        }

        let condition = condition.into().resolve()?;

        let rule = AutoTradeRule {
            id: ObjectId::new(),
            user_id: user.to_string(),
            symbol: sym,
            condition,
            action,
            quantity,
            active: true,
            created_at: Utc::now().timestamp_millis(),
            executed_at: None,
        };

        self.store.insert_rule(&rule).await?;

        tracing::info!(
            rule = %rule.id,
            user = %rule.user_id,
            symbol = %rule.symbol,
            condition = %rule.condition,
            action = %rule.action,
            quantity = rule.quantity,
            "rule registered"
        );
        let _ = self.events_tx.send("rulesUpdated".to_string());

        Ok(rule)
    }

    /// Active rules, for every user when `user_id` is `None`.
    pub async fn list_active(&self, user_id: Option<&str>) -> TradingResult<Vec<AutoTradeRule>> {
        let mut filter = RuleFilter::active();
        if let Some(u) = user_id {
            filter = filter.user(u);
        }
        self.store.list_rules(&filter).await
    }

    /// Every rule of the user, active or not.
    pub async fn list_for_user(&self, user_id: &str) -> TradingResult<Vec<AutoTradeRule>> {
        self.store.list_rules(&RuleFilter::default().user(user_id)).await
    }

    pub async fn get(&self, rule_id: ObjectId) -> TradingResult<AutoTradeRule> {
        self.store
            .get_rule(rule_id)
            .await?
            .ok_or_else(|| TradingError::NoSuchRule(rule_id.to_hex()))
    }

    /// Returns false when the rule was already inactive.
    pub async fn deactivate(&self, rule_id: ObjectId) -> TradingResult<bool> {
        let changed = self
            .store
            .deactivate_rule(rule_id, Utc::now().timestamp_millis())
            .await?;
        if changed {
            let _ = self.events_tx.send("rulesUpdated".to_string());
        }
        Ok(changed)
    }

    pub async fn delete(&self, rule_id: ObjectId) -> TradingResult<()> {
        if !self.store.delete_rule(rule_id).await? {
            return Err(TradingError::NoSuchRule(rule_id.to_hex()));
        }

        tracing::info!(rule = %rule_id, "rule deleted");
        let _ = self.events_tx.send("rulesUpdated".to_string());
        Ok(())
    }
}
