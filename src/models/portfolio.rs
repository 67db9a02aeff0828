use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Portfolio {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    // one portfolio per user, enforced by a unique index
    pub user_id: String,

    pub balance: Decimal,

    // bumped on every committed trade
    #[serde(default)]
    pub version: i64,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Portfolio {
    pub fn new(user_id: &str, balance: Decimal, now: i64) -> Self {
        Self {
            id: ObjectId::new(),
            user_id: user_id.to_string(),
            balance,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
