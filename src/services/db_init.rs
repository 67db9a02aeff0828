use mongodb::{
    bson::doc,
    options::IndexOptions,
    Database, IndexModel,
};

use super::mongo_store::{HOLDINGS, PORTFOLIOS, RULES, TRANSACTIONS};
use crate::error::TradingResult;

pub async fn ensure_indexes(db: &Database) -> TradingResult<()> {
    // portfolios: one per user, also the race guard for lazy creation
    {
        let col = db.collection::<mongodb::bson::Document>(PORTFOLIOS);
        let model = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        col.create_index(model, None).await?;
    }

    // holdings: unique per (portfolio_id, symbol)
    {
        let col = db.collection::<mongodb::bson::Document>(HOLDINGS);
        let model = IndexModel::builder()
            .keys(doc! { "portfolio_id": 1, "symbol": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        col.create_index(model, None).await?;
    }

    // transactions: history per portfolio, newest first
    {
        let col = db.collection::<mongodb::bson::Document>(TRANSACTIONS);
        let model = IndexModel::builder()
            .keys(doc! { "portfolio_id": 1, "timestamp": -1 })
            .build();

        col.create_index(model, None).await?;
    }

    // rules: scanner listing and per-user listing
    {
        let col = db.collection::<mongodb::bson::Document>(RULES);
        let scan = IndexModel::builder()
            .keys(doc! { "active": 1, "symbol": 1 })
            .build();
        let by_user = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .build();

        col.create_indexes([scan, by_user], None).await?;
    }

    Ok(())
}
