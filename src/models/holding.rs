use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub portfolio_id: ObjectId,
    pub symbol: String,

    // always > 0; a holding that reaches zero is deleted
    pub quantity: i64,
    // volume-weighted cost basis
    pub average_price: Decimal,

    pub updated_at: i64,
}
