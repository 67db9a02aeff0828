#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use papertrade::{
    config::Settings,
    services::{
        memory_store::MemoryStore,
        price_oracle::{PriceOracle, StaticPrices},
    },
    AppState,
};
use rust_decimal::Decimal;

pub fn test_settings() -> Settings {
    Settings {
        scan_interval: Duration::from_millis(20),
        price_timeout: Duration::from_millis(200),
        rule_timeout: Duration::from_millis(1_000),
        ..Settings::default()
    }
}

pub fn state_with(settings: Settings, oracle: Arc<dyn PriceOracle>) -> AppState {
    let store = Arc::new(MemoryStore::new(settings.starting_balance));
    AppState::new(settings, store, oracle)
}

/// In-memory state over a static price table the test can move.
pub fn test_state() -> (AppState, Arc<StaticPrices>) {
    test_state_with_balance(Settings::default().starting_balance)
}

/// Like `test_state`, with the table seeded up front.
pub fn priced_state(quotes: &[(&str, Decimal)]) -> (AppState, Arc<StaticPrices>) {
    let prices = Arc::new(StaticPrices::with_prices(quotes.iter().copied()));
    let state = state_with(test_settings(), prices.clone());
    (state, prices)
}

pub fn test_state_with_balance(starting_balance: Decimal) -> (AppState, Arc<StaticPrices>) {
    let settings = Settings {
        starting_balance,
        ..test_settings()
    };
    let prices = Arc::new(StaticPrices::new());
    let state = state_with(settings, prices.clone());
    (state, prices)
}
