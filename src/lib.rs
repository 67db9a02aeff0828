//! Library entrypoint for papertrade.
//!
//! The binary wires these pieces to a real store and price feed; integration
//! tests under `tests/` build the same state over the in-memory store.

pub mod config;
pub mod error;
pub mod models;

pub mod services;

pub mod controllers;
pub mod routes;

use std::sync::Arc;

use services::{
    order_executor::OrderExecutor,
    price_oracle::PriceOracle,
    rule_registry::RuleRegistry,
    rule_scanner::{RuleScanner, ScannerSettings},
    store::TradingStore,
};

#[derive(Clone)]
pub struct AppState {
    pub settings: config::Settings,
    pub store: Arc<dyn TradingStore>,
    pub oracle: Arc<dyn PriceOracle>,
    pub executor: OrderExecutor,
    pub rules: RuleRegistry,
    pub events_tx: tokio::sync::broadcast::Sender<String>,
}

impl AppState {
    pub fn new(
        settings: config::Settings,
        store: Arc<dyn TradingStore>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        let (events_tx, _events_rx) = tokio::sync::broadcast::channel::<String>(64);

        Self {
            executor: OrderExecutor::new(store.clone(), events_tx.clone()),
            rules: RuleRegistry::new(store.clone(), events_tx.clone()),
            settings,
            store,
            oracle,
            events_tx,
        }
    }

    /// Scanner sharing this state's executor, so its fills are serialized
    /// with request-driven orders on the same portfolio.
    pub fn scanner(&self) -> RuleScanner {
        RuleScanner::new(
            self.rules.clone(),
            self.oracle.clone(),
            self.executor.clone(),
            ScannerSettings::from(&self.settings),
            self.events_tx.clone(),
        )
    }
}
