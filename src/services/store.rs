//! Persistence seam for portfolios, holdings, transactions and rules.
//!
//! Portfolio state is only ever mutated through [`TradingStore::commit_trade`],
//! which applies the balance change, the holding change, the transaction
//! append and the optional rule consumption as a single unit.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;

use crate::{
    error::TradingResult,
    models::{AutoTradeRule, Holding, Portfolio, Transaction},
};

#[derive(Debug, Clone, PartialEq)]
pub enum HoldingChange {
    Upsert(Holding),
    Delete(ObjectId),
}

#[derive(Debug, Clone)]
pub struct TradeCommit {
    pub portfolio_id: ObjectId,
    // commit is rejected unless the stored version still matches
    pub expected_version: i64,
    pub new_balance: Decimal,
    pub holding: HoldingChange,
    pub transaction: Transaction,
    // deactivated in the same unit; the commit fails if it is no longer active
    pub consume_rule: Option<ObjectId>,
    pub now: i64,
}

#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub user_id: Option<String>,
    pub active_only: bool,
}

impl RuleFilter {
    pub fn active() -> Self {
        Self {
            user_id: None,
            active_only: true,
        }
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }
}

#[async_trait]
pub trait TradingStore: Send + Sync {
    /// Returns the user's portfolio, creating it with the starting balance.
    /// Concurrent callers for the same user observe the same portfolio.
    async fn get_or_create_portfolio(&self, user_id: &str) -> TradingResult<Portfolio>;

    async fn get_portfolio(&self, portfolio_id: ObjectId) -> TradingResult<Portfolio>;

    async fn get_holding(&self, portfolio_id: ObjectId, symbol: &str) -> TradingResult<Option<Holding>>;

    async fn list_holdings(&self, portfolio_id: ObjectId) -> TradingResult<Vec<Holding>>;

    /// Newest first.
    async fn list_transactions(&self, portfolio_id: ObjectId) -> TradingResult<Vec<Transaction>>;

    async fn commit_trade(&self, commit: TradeCommit) -> TradingResult<()>;

    async fn insert_rule(&self, rule: &AutoTradeRule) -> TradingResult<()>;

    async fn get_rule(&self, rule_id: ObjectId) -> TradingResult<Option<AutoTradeRule>>;

    /// Newest first. Records that fail to decode are skipped.
    async fn list_rules(&self, filter: &RuleFilter) -> TradingResult<Vec<AutoTradeRule>>;

    /// Returns false when the rule was missing or already inactive.
    async fn deactivate_rule(&self, rule_id: ObjectId, now: i64) -> TradingResult<bool>;

    async fn delete_rule(&self, rule_id: ObjectId) -> TradingResult<bool>;
}
