use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::TradingError;

/// Known misspellings mapped to their canonical ticker.
const SYMBOL_ALIASES: &[(&str, &str)] = &[("APPL", "AAPL")];

/// Trims, upper-cases and resolves known aliases.
pub fn normalize_symbol(symbol: &str) -> String {
    let sym = symbol.trim().to_uppercase();
    SYMBOL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == sym)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(sym)
}

/// Result of a price lookup. `Unavailable` is a skip signal, never a zero price.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceQuote {
    Available(Decimal),
    Unavailable { reason: String },
}

impl PriceQuote {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        PriceQuote::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn price(&self) -> Option<Decimal> {
        match self {
            PriceQuote::Available(p) => Some(*p),
            PriceQuote::Unavailable { .. } => None,
        }
    }

    pub fn into_result(self, symbol: &str) -> Result<Decimal, TradingError> {
        match self {
            PriceQuote::Available(p) => Ok(p),
            PriceQuote::Unavailable { reason } => Err(TradingError::PriceUnavailable {
                symbol: symbol.to_string(),
                reason,
            }),
        }
    }
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn last_price(&self, symbol: &str) -> PriceQuote;
}

/// Looks up a price, treating a lookup that outlives `limit` as unavailable.
pub async fn last_price_within(oracle: &dyn PriceOracle, symbol: &str, limit: Duration) -> PriceQuote {
    match tokio::time::timeout(limit, oracle.last_price(symbol)).await {
        Ok(q) => q,
        Err(_) => PriceQuote::unavailable("price lookup timed out"),
    }
}

/// Fixed price table. Backs the offline mode and the test suite.
#[derive(Debug, Default)]
pub struct StaticPrices {
    prices: RwLock<HashMap<String, Decimal>>,
}

impl StaticPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices<I, S>(prices: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: AsRef<str>,
    {
        let table = Self::new();
        for (sym, price) in prices {
            table.set(sym.as_ref(), price);
        }
        table
    }

    pub fn set(&self, symbol: &str, price: Decimal) {
        if let Ok(mut map) = self.prices.write() {
            map.insert(normalize_symbol(symbol), price);
        }
    }

    pub fn remove(&self, symbol: &str) {
        if let Ok(mut map) = self.prices.write() {
            map.remove(&normalize_symbol(symbol));
        }
    }
}

#[async_trait]
impl PriceOracle for StaticPrices {
    async fn last_price(&self, symbol: &str) -> PriceQuote {
        let sym = normalize_symbol(symbol);
        let Ok(map) = self.prices.read() else {
            return PriceQuote::unavailable("price table poisoned");
        };

        match map.get(&sym) {
            Some(p) if *p > Decimal::ZERO => PriceQuote::Available(*p),
            _ => PriceQuote::unavailable(format!("no price for {sym}")),
        }
    }
}
