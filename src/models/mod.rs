pub mod portfolio;
pub mod holding;
pub mod transaction;
pub mod rule;

pub use portfolio::Portfolio;
pub use holding::Holding;
pub use transaction::{Side, Transaction};
pub use rule::{AutoTradeRule, Comparator, Condition};
