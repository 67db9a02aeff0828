use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use thiserror::Error;

pub type TradingResult<T> = Result<T, TradingError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TradingError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Insufficient holdings of {symbol}: requested {requested}, held {held}")]
    InsufficientHoldings {
        symbol: String,
        requested: i64,
        held: i64,
    },

    #[error("No holding of {symbol} in this portfolio")]
    NoSuchHolding { symbol: String },

    #[error("Portfolio {0} not found")]
    NoSuchPortfolio(String),

    #[error("Rule {0} not found")]
    NoSuchRule(String),

    #[error("Malformed condition '{input}': expected 'price < N' or 'price > N'")]
    MalformedCondition { input: String },

    #[error("Price unavailable for {symbol}: {reason}")]
    PriceUnavailable { symbol: String, reason: String },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Portfolio {0} was modified concurrently")]
    ConcurrentModification(ObjectId),

    #[error("Rule {0} is no longer active")]
    RuleNotActive(ObjectId),

    #[error("{0} timed out")]
    Timeout(String),
}

impl TradingError {
    /// Short stable identifier used in API bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            TradingError::InsufficientFunds { .. } => "insufficient_funds",
            TradingError::InsufficientHoldings { .. } => "insufficient_holdings",
            TradingError::NoSuchHolding { .. } => "no_such_holding",
            TradingError::NoSuchPortfolio(_) => "no_such_portfolio",
            TradingError::NoSuchRule(_) => "no_such_rule",
            TradingError::MalformedCondition { .. } => "malformed_condition",
            TradingError::PriceUnavailable { .. } => "price_unavailable",
            TradingError::StorageUnavailable(_) => "storage_unavailable",
            TradingError::InvalidOrder(_) => "invalid_order",
            TradingError::ConcurrentModification(_) => "concurrent_modification",
            TradingError::RuleNotActive(_) => "rule_not_active",
            TradingError::Timeout(_) => "timeout",
        }
    }

    /// Rejections caused by the order itself rather than by infrastructure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TradingError::InsufficientFunds { .. }
                | TradingError::InsufficientHoldings { .. }
                | TradingError::NoSuchHolding { .. }
                | TradingError::InvalidOrder(_)
        )
    }
}

impl From<mongodb::error::Error> for TradingError {
    fn from(e: mongodb::error::Error) -> Self {
        TradingError::StorageUnavailable(e.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for TradingError {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        TradingError::StorageUnavailable(e.to_string())
    }
}
