use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;

use super::store::{HoldingChange, RuleFilter, TradeCommit, TradingStore};
use crate::{
    error::{TradingError, TradingResult},
    models::{AutoTradeRule, Holding, Portfolio, Transaction},
};

#[derive(Default)]
struct Inner {
    portfolios: HashMap<ObjectId, Portfolio>,
    by_user: HashMap<String, ObjectId>,
    holdings: HashMap<(ObjectId, String), Holding>,
    transactions: Vec<Transaction>,
    rules: HashMap<ObjectId, AutoTradeRule>,
}

/// Process-local store. One mutex guards every table, so each call is atomic.
pub struct MemoryStore {
    starting_balance: Decimal,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            starting_balance,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> TradingResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| TradingError::StorageUnavailable("memory store poisoned".to_string()))
    }
}

#[async_trait]
impl TradingStore for MemoryStore {
    async fn get_or_create_portfolio(&self, user_id: &str) -> TradingResult<Portfolio> {
        let mut inner = self.lock()?;

        if let Some(id) = inner.by_user.get(user_id) {
            if let Some(p) = inner.portfolios.get(id) {
                return Ok(p.clone());
            }
        }

        let portfolio = Portfolio::new(user_id, self.starting_balance, Utc::now().timestamp_millis());
        inner.by_user.insert(user_id.to_string(), portfolio.id);
        inner.portfolios.insert(portfolio.id, portfolio.clone());
        Ok(portfolio)
    }

    async fn get_portfolio(&self, portfolio_id: ObjectId) -> TradingResult<Portfolio> {
        self.lock()?
            .portfolios
            .get(&portfolio_id)
            .cloned()
            .ok_or_else(|| TradingError::NoSuchPortfolio(portfolio_id.to_hex()))
    }

    async fn get_holding(&self, portfolio_id: ObjectId, symbol: &str) -> TradingResult<Option<Holding>> {
        Ok(self
            .lock()?
            .holdings
            .get(&(portfolio_id, symbol.to_string()))
            .cloned())
    }

    async fn list_holdings(&self, portfolio_id: ObjectId) -> TradingResult<Vec<Holding>> {
        let inner = self.lock()?;
        let mut out: Vec<Holding> = inner
            .holdings
            .values()
            .filter(|h| h.portfolio_id == portfolio_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.symbol.cmp(&b.symbol)));
        Ok(out)
    }

    async fn list_transactions(&self, portfolio_id: ObjectId) -> TradingResult<Vec<Transaction>> {
        let inner = self.lock()?;
        // stored in append order; reversing keeps same-millisecond fills newest first
        Ok(inner
            .transactions
            .iter()
            .rev()
            .filter(|t| t.portfolio_id == portfolio_id)
            .cloned()
            .collect())
    }

    async fn commit_trade(&self, commit: TradeCommit) -> TradingResult<()> {
        let mut inner = self.lock()?;

        let portfolio = inner
            .portfolios
            .get(&commit.portfolio_id)
            .ok_or_else(|| TradingError::NoSuchPortfolio(commit.portfolio_id.to_hex()))?;
        if portfolio.version != commit.expected_version {
            return Err(TradingError::ConcurrentModification(commit.portfolio_id));
        }
        if commit.new_balance < Decimal::ZERO {
            return Err(TradingError::InvalidOrder("balance would go negative".to_string()));
        }

        if let Some(rule_id) = commit.consume_rule {
            match inner.rules.get(&rule_id) {
                Some(r) if r.active => {}
                _ => return Err(TradingError::RuleNotActive(rule_id)),
            }
        }

        // every check passed; apply all changes under the same guard
        if let Some(rule_id) = commit.consume_rule {
            if let Some(r) = inner.rules.get_mut(&rule_id) {
                r.active = false;
                r.executed_at = Some(commit.now);
            }
        }

        match commit.holding {
            HoldingChange::Upsert(h) => {
                inner.holdings.insert((h.portfolio_id, h.symbol.clone()), h);
            }
            HoldingChange::Delete(id) => {
                inner.holdings.retain(|_, h| h.id != id);
            }
        }

        inner.transactions.push(commit.transaction);

        if let Some(p) = inner.portfolios.get_mut(&commit.portfolio_id) {
            p.balance = commit.new_balance;
            p.version += 1;
            p.updated_at = commit.now;
        }

        Ok(())
    }

    async fn insert_rule(&self, rule: &AutoTradeRule) -> TradingResult<()> {
        self.lock()?.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn get_rule(&self, rule_id: ObjectId) -> TradingResult<Option<AutoTradeRule>> {
        Ok(self.lock()?.rules.get(&rule_id).cloned())
    }

    async fn list_rules(&self, filter: &RuleFilter) -> TradingResult<Vec<AutoTradeRule>> {
        let inner = self.lock()?;
        let mut out: Vec<AutoTradeRule> = inner
            .rules
            .values()
            .filter(|r| !filter.active_only || r.active)
            .filter(|r| filter.user_id.as_deref().is_none_or(|u| r.user_id == u))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn deactivate_rule(&self, rule_id: ObjectId, now: i64) -> TradingResult<bool> {
        let mut inner = self.lock()?;
        match inner.rules.get_mut(&rule_id) {
            Some(r) if r.active => {
                r.active = false;
                r.executed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_rule(&self, rule_id: ObjectId) -> TradingResult<bool> {
        Ok(self.lock()?.rules.remove(&rule_id).is_some())
    }
}
