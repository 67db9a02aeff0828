use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use mongodb::bson::oid::ObjectId;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;
use crate::error::TradingError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Comparator {
    #[serde(rename = "<")]
    Below,
    #[serde(rename = ">")]
    Above,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Below => "<",
            Comparator::Above => ">",
        }
    }
}

/// Structured trigger condition, e.g. `price < 150.5`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    pub operator: Comparator,
    pub threshold: Decimal,
}

impl Condition {
    pub fn below(threshold: Decimal) -> Self {
        Self {
            operator: Comparator::Below,
            threshold,
        }
    }

    pub fn above(threshold: Decimal) -> Self {
        Self {
            operator: Comparator::Above,
            threshold,
        }
    }

    /// Both comparisons are strict: a price equal to the threshold never triggers.
    pub fn is_met(&self, price: Decimal) -> bool {
        match self.operator {
            Comparator::Below => price < self.threshold,
            Comparator::Above => price > self.threshold,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "price {} {}", self.operator.symbol(), self.threshold)
    }
}

fn condition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*price\s*([<>])\s*(\d+(?:\.\d+)?)\s*$").expect("valid condition regex")
    })
}

impl FromStr for Condition {
    type Err = TradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TradingError::MalformedCondition { input: s.to_string() };

        let caps = condition_re().captures(s).ok_or_else(malformed)?;
        let threshold = Decimal::from_str(&caps[2]).map_err(|_| malformed())?;
        if threshold <= Decimal::ZERO {
            return Err(malformed());
        }

        let operator = match &caps[1] {
            "<" => Comparator::Below,
            _ => Comparator::Above,
        };

        Ok(Condition { operator, threshold })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoTradeRule {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: String,
    pub symbol: String,

    pub condition: Condition,
    pub action: Side,
    pub quantity: i64,

    // flips to false once, when the rule's trade commits
    pub active: bool,

    pub created_at: i64,
    #[serde(default)]
    pub executed_at: Option<i64>,
}
