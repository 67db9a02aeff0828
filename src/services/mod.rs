pub mod price_oracle;
pub mod finnhub;

pub mod store;
pub mod memory_store;
pub mod mongo_store;
pub mod db_init;

pub mod order_executor;
pub mod rule_registry;
pub mod rule_scanner;

pub mod trading_service;
pub mod portfolio_service;
