use std::env;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const DEFAULT_STARTING_BALANCE: Decimal = dec!(100000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Mongo,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    pub store_backend: StoreBackend,
    pub mongodb_uri: String,
    pub mongodb_db: String,

    pub finnhub_api_key: String,

    pub starting_balance: Decimal,

    pub scan_interval: Duration,
    pub price_timeout: Duration,
    pub rule_timeout: Duration,
    pub scan_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            store_backend: StoreBackend::Memory,
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_db: "papertrade".to_string(),
            finnhub_api_key: String::new(),
            starting_balance: DEFAULT_STARTING_BALANCE,
            scan_interval: Duration::from_secs(10),
            price_timeout: Duration::from_millis(5_000),
            rule_timeout: Duration::from_millis(10_000),
            scan_concurrency: 8,
        }
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

pub fn load() -> Settings {
    // Loads .env if present (no crash if missing)
    dotenvy::dotenv().ok();

    let defaults = Settings::default();

    let store_backend = match env::var("STORE_BACKEND")
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "mongo" | "mongodb" => StoreBackend::Mongo,
        _ => StoreBackend::Memory,
    };

    let starting_balance = parsed::<Decimal>("STARTING_BALANCE")
        .filter(|b| *b >= Decimal::ZERO)
        .unwrap_or(defaults.starting_balance);

    Settings {
        host: env::var("HOST").unwrap_or(defaults.host),
        port: parsed("PORT").unwrap_or(defaults.port),
        store_backend,
        mongodb_uri: env::var("MONGODB_URI").unwrap_or(defaults.mongodb_uri),
        mongodb_db: env::var("MONGODB_DB").unwrap_or(defaults.mongodb_db),
        finnhub_api_key: env::var("FINNHUB_API_KEY").unwrap_or_default(),
        starting_balance,
        scan_interval: parsed::<u64>("SCAN_INTERVAL_SECS")
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.scan_interval),
        price_timeout: parsed::<u64>("PRICE_TIMEOUT_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.price_timeout),
        rule_timeout: parsed::<u64>("RULE_TIMEOUT_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.rule_timeout),
        scan_concurrency: parsed::<usize>("SCAN_CONCURRENCY")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.scan_concurrency),
    }
}
