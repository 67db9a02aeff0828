use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

use super::price_oracle::{normalize_symbol, PriceOracle, PriceQuote};

const QUOTE_URL: &str = "https://finnhub.io/api/v1/quote";

#[derive(Clone)]
pub struct FinnhubClient {
    http: Client,
    api_key: String,
}

impl FinnhubClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
        }
    }

    fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub async fn quote(&self, symbol: &str) -> Result<QuoteResponse, String> {
        if !self.has_key() {
            return Err("FINNHUB_API_KEY is missing in .env".to_string());
        }

        let res = self
            .http
            .get(QUOTE_URL)
            .query(&[("symbol", symbol), ("token", &self.api_key)])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("Finnhub quote failed: {status} {body}"));
        }

        res.json::<QuoteResponse>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl PriceOracle for FinnhubClient {
    async fn last_price(&self, symbol: &str) -> PriceQuote {
        let sym = normalize_symbol(symbol);

        let quote = match self.quote(&sym).await {
            Ok(q) => q,
            Err(e) => {
                tracing::debug!(symbol = %sym, error = %e, "finnhub quote failed");
                return PriceQuote::unavailable(e);
            }
        };

        // Finnhub answers unknown symbols with an all-zero quote.
        if !quote.c.is_finite() || quote.c <= 0.0 {
            return PriceQuote::unavailable(format!("no trades reported for {sym}"));
        }

        match Decimal::from_f64(quote.c) {
            Some(p) => PriceQuote::Available(p.round_dp(4)),
            None => PriceQuote::unavailable(format!("unrepresentable price {}", quote.c)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QuoteResponse {
    // current
    pub c: f64,
    // change
    #[serde(default)]
    pub d: Option<f64>,
    // previous close
    #[serde(default)]
    pub pc: f64,
    // timestamp
    #[serde(default)]
    pub t: i64,
}
