use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Document};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOptions, ReplaceOptions, ReturnDocument,
};
use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};
use mongodb::{Client, ClientSession, Collection, Database};
use rust_decimal::Decimal;

use super::store::{HoldingChange, RuleFilter, TradeCommit, TradingStore};
use crate::{
    error::{TradingError, TradingResult},
    models::{AutoTradeRule, Holding, Portfolio, Transaction},
};

pub const PORTFOLIOS: &str = "portfolios";
pub const HOLDINGS: &str = "holdings";
pub const TRANSACTIONS: &str = "transactions";
pub const RULES: &str = "auto_trade_rules";

const WRITE_CONFLICT: i32 = 112;

/// MongoDB-backed store. Trade commits run inside a multi-document
/// transaction, which requires the server to be a replica set member.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    starting_balance: Decimal,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str, starting_balance: Decimal) -> TradingResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(db_name);
        Ok(Self {
            client,
            db,
            starting_balance,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn portfolios(&self) -> Collection<Portfolio> {
        self.db.collection::<Portfolio>(PORTFOLIOS)
    }

    fn holdings(&self) -> Collection<Holding> {
        self.db.collection::<Holding>(HOLDINGS)
    }

    fn transactions(&self) -> Collection<Transaction> {
        self.db.collection::<Transaction>(TRANSACTIONS)
    }

    fn rules(&self) -> Collection<AutoTradeRule> {
        self.db.collection::<AutoTradeRule>(RULES)
    }

    async fn apply_commit(&self, commit: &TradeCommit, session: &mut ClientSession) -> TradingResult<()> {
        let conflict = |e: mongodb::error::Error| commit_error(e, commit.portfolio_id);

        let res = self
            .portfolios()
            .update_one_with_session(
                doc! { "_id": commit.portfolio_id, "version": commit.expected_version },
                doc! {
                    "$set": {
                        "balance": commit.new_balance.to_string(),
                        "updated_at": commit.now,
                    },
                    "$inc": { "version": 1_i64 },
                },
                None,
                session,
            )
            .await
            .map_err(conflict)?;
        if res.matched_count == 0 {
            return Err(TradingError::ConcurrentModification(commit.portfolio_id));
        }

        if let Some(rule_id) = commit.consume_rule {
            let res = self
                .rules()
                .update_one_with_session(
                    doc! { "_id": rule_id, "active": true },
                    doc! { "$set": { "active": false, "executed_at": commit.now } },
                    None,
                    session,
                )
                .await
                .map_err(conflict)?;
            if res.matched_count == 0 {
                return Err(TradingError::RuleNotActive(rule_id));
            }
        }

        match &commit.holding {
            HoldingChange::Upsert(h) => {
                self.holdings()
                    .replace_one_with_session(
                        doc! { "_id": h.id },
                        h,
                        ReplaceOptions::builder().upsert(true).build(),
                        session,
                    )
                    .await
                    .map_err(conflict)?;
            }
            HoldingChange::Delete(id) => {
                self.holdings()
                    .delete_one_with_session(doc! { "_id": id }, None, session)
                    .await
                    .map_err(conflict)?;
            }
        }

        self.transactions()
            .insert_one_with_session(&commit.transaction, None, session)
            .await
            .map_err(conflict)?;

        Ok(())
    }
}

/// Write conflicts inside a trade transaction are retryable; the executor
/// expects them as `ConcurrentModification`. Everything else is storage failure.
pub fn commit_error(err: mongodb::error::Error, portfolio_id: ObjectId) -> TradingError {
    let write_conflict = match err.kind.as_ref() {
        ErrorKind::Command(c) => c.code == WRITE_CONFLICT,
        ErrorKind::Write(WriteFailure::WriteError(w)) => w.code == WRITE_CONFLICT,
        _ => false,
    };

    if write_conflict || err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        TradingError::ConcurrentModification(portfolio_id)
    } else {
        TradingError::from(err)
    }
}

async fn collect<T>(mut cursor: mongodb::Cursor<T>) -> TradingResult<Vec<T>>
where
    T: serde::de::DeserializeOwned + Unpin + Send + Sync,
{
    let mut out: Vec<T> = vec![];
    while let Some(res) = cursor.next().await {
        out.push(res?);
    }
    Ok(out)
}

#[async_trait]
impl TradingStore for MongoStore {
    async fn get_or_create_portfolio(&self, user_id: &str) -> TradingResult<Portfolio> {
        let portfolios = self.portfolios();

        let mut fresh = bson::to_document(&Portfolio::new(
            user_id,
            self.starting_balance,
            Utc::now().timestamp_millis(),
        ))?;
        fresh.remove("user_id");

        let opts = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        match portfolios
            .find_one_and_update(doc! { "user_id": user_id }, doc! { "$setOnInsert": fresh }, opts)
            .await
        {
            Ok(Some(p)) => Ok(p),
            // a concurrent upsert won the unique index race; read its document
            Ok(None) | Err(_) => portfolios
                .find_one(doc! { "user_id": user_id }, None)
                .await?
                .ok_or_else(|| TradingError::NoSuchPortfolio(user_id.to_string())),
        }
    }

    async fn get_portfolio(&self, portfolio_id: ObjectId) -> TradingResult<Portfolio> {
        self.portfolios()
            .find_one(doc! { "_id": portfolio_id }, None)
            .await?
            .ok_or_else(|| TradingError::NoSuchPortfolio(portfolio_id.to_hex()))
    }

    async fn get_holding(&self, portfolio_id: ObjectId, symbol: &str) -> TradingResult<Option<Holding>> {
        Ok(self
            .holdings()
            .find_one(doc! { "portfolio_id": portfolio_id, "symbol": symbol }, None)
            .await?)
    }

    async fn list_holdings(&self, portfolio_id: ObjectId) -> TradingResult<Vec<Holding>> {
        let find_opts = FindOptions::builder().sort(doc! { "updated_at": -1, "symbol": 1 }).build();
        let cursor = self
            .holdings()
            .find(doc! { "portfolio_id": portfolio_id }, find_opts)
            .await?;
        collect(cursor).await
    }

    async fn list_transactions(&self, portfolio_id: ObjectId) -> TradingResult<Vec<Transaction>> {
        let find_opts = FindOptions::builder().sort(doc! { "timestamp": -1, "_id": -1 }).build();
        let cursor = self
            .transactions()
            .find(doc! { "portfolio_id": portfolio_id }, find_opts)
            .await?;
        collect(cursor).await
    }

    async fn commit_trade(&self, commit: TradeCommit) -> TradingResult<()> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        match self.apply_commit(&commit, &mut session).await {
            Ok(()) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| commit_error(e, commit.portfolio_id))?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    tracing::warn!(error = %abort_err, "failed to abort trade transaction");
                }
                Err(e)
            }
        }
    }

    async fn insert_rule(&self, rule: &AutoTradeRule) -> TradingResult<()> {
        self.rules().insert_one(rule, None).await?;
        Ok(())
    }

    async fn get_rule(&self, rule_id: ObjectId) -> TradingResult<Option<AutoTradeRule>> {
        Ok(self.rules().find_one(doc! { "_id": rule_id }, None).await?)
    }

    async fn list_rules(&self, filter: &RuleFilter) -> TradingResult<Vec<AutoTradeRule>> {
        let mut query = Document::new();
        if filter.active_only {
            query.insert("active", true);
        }
        if let Some(user_id) = &filter.user_id {
            query.insert("user_id", user_id.as_str());
        }

        let find_opts = FindOptions::builder().sort(doc! { "created_at": -1, "_id": -1 }).build();

        // raw documents, so one bad record cannot poison the listing
        let mut cursor = self
            .db
            .collection::<Document>(RULES)
            .find(query, find_opts)
            .await?;

        let mut out: Vec<AutoTradeRule> = vec![];
        while let Some(item) = cursor.next().await {
            let raw = item?;
            match bson::from_document::<AutoTradeRule>(raw.clone()) {
                Ok(rule) => out.push(rule),
                Err(e) => {
                    let err = TradingError::MalformedCondition {
                        input: raw.get("condition").map(|c| c.to_string()).unwrap_or_default(),
                    };
                    tracing::warn!(id = ?raw.get_object_id("_id").ok(), error = %e, %err, "skipping undecodable rule");
                }
            }
        }
        Ok(out)
    }

    async fn deactivate_rule(&self, rule_id: ObjectId, now: i64) -> TradingResult<bool> {
        let res = self
            .rules()
            .update_one(
                doc! { "_id": rule_id, "active": true },
                doc! { "$set": { "active": false, "executed_at": now } },
                None,
            )
            .await?;
        Ok(res.modified_count > 0)
    }

    async fn delete_rule(&self, rule_id: ObjectId) -> TradingResult<bool> {
        let res = self.rules().delete_one(doc! { "_id": rule_id }, None).await?;
        Ok(res.deleted_count > 0)
    }
}
