mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use papertrade::{
    config::Settings,
    error::{TradingError, TradingResult},
    models::{AutoTradeRule, Condition, Holding, Portfolio, Side, Transaction},
    services::{
        memory_store::MemoryStore,
        price_oracle::{PriceOracle, PriceQuote, StaticPrices},
        rule_scanner::{CycleReport, RuleOutcome},
        store::{RuleFilter, TradeCommit, TradingStore},
    },
    AppState,
};
use rust_decimal_macros::dec;

/// Never answers for `HANG`; delegates everything else.
struct HangingOracle {
    prices: Arc<StaticPrices>,
}

#[async_trait]
impl PriceOracle for HangingOracle {
    async fn last_price(&self, symbol: &str) -> PriceQuote {
        if symbol == "HANG" {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.prices.last_price(symbol).await
    }
}

/// Answers after a delay, flagging when a lookup has started.
struct SlowOracle {
    prices: Arc<StaticPrices>,
    delay: Duration,
    entered: Arc<AtomicBool>,
}

#[async_trait]
impl PriceOracle for SlowOracle {
    async fn last_price(&self, symbol: &str) -> PriceQuote {
        self.entered.store(true, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.prices.last_price(symbol).await
    }
}

/// Memory store whose rule listing can be switched off and whose commits
/// never finish for one symbol.
struct FlakyStore {
    inner: MemoryStore,
    rules_down: AtomicBool,
    stuck_symbol: Option<&'static str>,
}

impl FlakyStore {
    fn new(starting_balance: rust_decimal::Decimal) -> Self {
        Self {
            inner: MemoryStore::new(starting_balance),
            rules_down: AtomicBool::new(false),
            stuck_symbol: None,
        }
    }
}

#[async_trait]
impl TradingStore for FlakyStore {
    async fn get_or_create_portfolio(&self, user_id: &str) -> TradingResult<Portfolio> {
        self.inner.get_or_create_portfolio(user_id).await
    }

    async fn get_portfolio(&self, portfolio_id: ObjectId) -> TradingResult<Portfolio> {
        self.inner.get_portfolio(portfolio_id).await
    }

    async fn get_holding(&self, portfolio_id: ObjectId, symbol: &str) -> TradingResult<Option<Holding>> {
        self.inner.get_holding(portfolio_id, symbol).await
    }

    async fn list_holdings(&self, portfolio_id: ObjectId) -> TradingResult<Vec<Holding>> {
        self.inner.list_holdings(portfolio_id).await
    }

    async fn list_transactions(&self, portfolio_id: ObjectId) -> TradingResult<Vec<Transaction>> {
        self.inner.list_transactions(portfolio_id).await
    }

    async fn commit_trade(&self, commit: TradeCommit) -> TradingResult<()> {
        if self.stuck_symbol == Some(commit.transaction.symbol.as_str()) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.inner.commit_trade(commit).await
    }

    async fn insert_rule(&self, rule: &AutoTradeRule) -> TradingResult<()> {
        self.inner.insert_rule(rule).await
    }

    async fn get_rule(&self, rule_id: ObjectId) -> TradingResult<Option<AutoTradeRule>> {
        self.inner.get_rule(rule_id).await
    }

    async fn list_rules(&self, filter: &RuleFilter) -> TradingResult<Vec<AutoTradeRule>> {
        if self.rules_down.load(Ordering::SeqCst) {
            return Err(TradingError::StorageUnavailable("connection refused".to_string()));
        }
        self.inner.list_rules(filter).await
    }

    async fn deactivate_rule(&self, rule_id: ObjectId, now: i64) -> TradingResult<bool> {
        self.inner.deactivate_rule(rule_id, now).await
    }

    async fn delete_rule(&self, rule_id: ObjectId) -> TradingResult<bool> {
        self.inner.delete_rule(rule_id).await
    }
}

async fn wait_until<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn triggered_sell_rule_fills_and_deactivates() {
    let (state, prices) = common::test_state();
    let p = state.store.get_or_create_portfolio("alice").await.unwrap();

    state.executor.execute(p.id, "AAPL", Side::Buy, 10, dec!(150)).await.unwrap();
    let rule = state
        .rules
        .add_rule("alice", "AAPL", "price > 160", Side::Sell, 5)
        .await
        .unwrap();

    prices.set("AAPL", dec!(165));
    let report = state.scanner().run_cycle().await.unwrap();
    assert_eq!(
        report,
        CycleReport {
            scanned: 1,
            executed: 1,
            ..CycleReport::default()
        }
    );

    let p = state.store.get_portfolio(p.id).await.unwrap();
    assert_eq!(p.balance, dec!(99325));

    let h = state.store.get_holding(p.id, "AAPL").await.unwrap().unwrap();
    assert_eq!(h.quantity, 5);
    assert_eq!(h.average_price, dec!(150));

    let rule = state.rules.get(rule.id).await.unwrap();
    assert!(!rule.active);
    assert!(rule.executed_at.is_some());

    let txns = state.store.list_transactions(p.id).await.unwrap();
    assert_eq!(txns[0].side, Side::Sell);
    assert_eq!(txns[0].price, dec!(165));
    assert_eq!(txns[0].rule_id, Some(rule.id));

    // consumed rules are never picked up again
    let report = state.scanner().run_cycle().await.unwrap();
    assert_eq!(report.scanned, 0);
}

#[tokio::test]
async fn below_rule_only_triggers_strictly_under_threshold() {
    let (state, prices) = common::test_state();
    let rule = state
        .rules
        .add_rule("alice", "AAPL", "price < 100", Side::Buy, 1)
        .await
        .unwrap();
    let scanner = state.scanner();

    for observed in [dec!(100), dec!(150)] {
        prices.set("AAPL", observed);
        let report = scanner.run_cycle().await.unwrap();
        assert_eq!(report.not_triggered, 1, "price {observed}");
        assert!(state.rules.get(rule.id).await.unwrap().active);
    }

    prices.set("AAPL", dec!(99));
    let report = scanner.run_cycle().await.unwrap();
    assert_eq!(report.executed, 1);
    assert!(!state.rules.get(rule.id).await.unwrap().active);

    let p = state.store.get_or_create_portfolio("alice").await.unwrap();
    assert_eq!(p.balance, dec!(100000) - dec!(99));
}

#[tokio::test]
async fn rejected_fill_leaves_rule_active_and_retries_next_cycle() {
    let (state, prices) = common::test_state_with_balance(dec!(50));
    let rule = state
        .rules
        .add_rule("alice", "XYZ", "price < 10", Side::Buy, 100)
        .await
        .unwrap();
    prices.set("XYZ", dec!(9));

    let scanner = state.scanner();
    for _ in 0..2 {
        let report = scanner.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.executed, 0);
        assert!(state.rules.get(rule.id).await.unwrap().active);
    }

    let outcome = scanner.evaluate_rule(rule.clone()).await;
    assert!(matches!(
        outcome,
        RuleOutcome::Failed(TradingError::InsufficientFunds { .. })
    ));

    let p = state.store.get_or_create_portfolio("alice").await.unwrap();
    assert_eq!(p.balance, dec!(50));
    assert!(state.store.list_transactions(p.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_price_skips_rule_this_cycle() {
    let (state, prices) = common::test_state();
    let rule = state
        .rules
        .add_rule("alice", "NOPE", "price < 100", Side::Buy, 1)
        .await
        .unwrap();

    let report = state.scanner().run_cycle().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert!(state.rules.get(rule.id).await.unwrap().active);

    prices.set("NOPE", dec!(50));
    let report = state.scanner().run_cycle().await.unwrap();
    assert_eq!(report.executed, 1);
}

#[tokio::test]
async fn legacy_alias_symbol_is_priced_and_filled_under_canonical_ticker() {
    let (state, _) = common::priced_state(&[("AAPL", dec!(100))]);

    let legacy = AutoTradeRule {
        id: ObjectId::new(),
        user_id: "alice".to_string(),
        symbol: "APPL".to_string(),
        condition: Condition::below(dec!(120)),
        action: Side::Buy,
        quantity: 2,
        active: true,
        created_at: Utc::now().timestamp_millis(),
        executed_at: None,
    };
    state.store.insert_rule(&legacy).await.unwrap();

    let report = state.scanner().run_cycle().await.unwrap();
    assert_eq!(report.executed, 1);

    let p = state.store.get_or_create_portfolio("alice").await.unwrap();
    let h = state.store.get_holding(p.id, "AAPL").await.unwrap().unwrap();
    assert_eq!(h.quantity, 2);
}

#[tokio::test]
async fn hung_price_lookup_does_not_stall_other_rules() {
    let prices = Arc::new(StaticPrices::new());
    prices.set("AAPL", dec!(90));
    let state = common::state_with(
        common::test_settings(),
        Arc::new(HangingOracle {
            prices: prices.clone(),
        }),
    );

    let hung = state.rules.add_rule("alice", "HANG", "price < 100", Side::Buy, 1).await.unwrap();
    state.rules.add_rule("alice", "AAPL", "price < 100", Side::Buy, 1).await.unwrap();

    let started = Instant::now();
    let report = state.scanner().run_cycle().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(report.scanned, 2);
    assert_eq!(report.executed, 1);
    assert_eq!(report.skipped, 1);
    assert!(state.rules.get(hung.id).await.unwrap().active);
}

#[tokio::test]
async fn stuck_fill_times_out_without_stalling_other_rules() {
    let settings = Settings {
        rule_timeout: Duration::from_millis(300),
        ..common::test_settings()
    };
    let store = Arc::new(FlakyStore {
        stuck_symbol: Some("SLOW"),
        ..FlakyStore::new(settings.starting_balance)
    });
    let prices = Arc::new(StaticPrices::with_prices([("SLOW", dec!(10)), ("AAPL", dec!(10))]));
    let state = AppState::new(settings, store, prices);

    let stuck = state.rules.add_rule("bob", "SLOW", "price < 20", Side::Buy, 1).await.unwrap();
    let ok = state.rules.add_rule("alice", "AAPL", "price < 20", Side::Buy, 1).await.unwrap();

    let started = Instant::now();
    let report = state.scanner().run_cycle().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(report.scanned, 2);
    assert_eq!(report.executed, 1);
    assert_eq!(report.failed, 1);
    assert!(!state.rules.get(ok.id).await.unwrap().active);
    assert!(state.rules.get(stuck.id).await.unwrap().active);

    let outcome = state.scanner().evaluate_rule(stuck).await;
    assert!(matches!(outcome, RuleOutcome::Failed(TradingError::Timeout(_))));

    let bob = state.store.get_or_create_portfolio("bob").await.unwrap();
    assert_eq!(bob.balance, dec!(100000));
    assert!(state.store.list_transactions(bob.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn rule_deleted_before_fill_is_not_executed() {
    let (state, prices) = common::test_state();
    prices.set("AAPL", dec!(50));
    let rule = state
        .rules
        .add_rule("alice", "AAPL", "price < 100", Side::Buy, 1)
        .await
        .unwrap();

    state.rules.delete(rule.id).await.unwrap();

    let outcome = state.scanner().evaluate_rule(rule).await;
    assert!(matches!(outcome, RuleOutcome::Failed(TradingError::RuleNotActive(_))));

    let p = state.store.get_or_create_portfolio("alice").await.unwrap();
    assert_eq!(p.balance, dec!(100000));
    assert!(state.store.list_holdings(p.id).await.unwrap().is_empty());
    assert!(state.store.list_transactions(p.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn direct_sell_racing_a_rule_sell_fills_only_once() {
    let (state, prices) = common::test_state();
    let p = state.store.get_or_create_portfolio("alice").await.unwrap();
    state.executor.execute(p.id, "AAPL", Side::Buy, 10, dec!(100)).await.unwrap();

    let rule = state
        .rules
        .add_rule("alice", "AAPL", "price > 120", Side::Sell, 10)
        .await
        .unwrap();
    prices.set("AAPL", dec!(130));

    let scanner = state.scanner();
    let executor = state.executor.clone();
    let (cycle, direct) = tokio::join!(
        scanner.run_cycle(),
        executor.execute(p.id, "AAPL", Side::Sell, 10, dec!(130)),
    );
    let cycle = cycle.unwrap();

    assert_eq!(cycle.executed + usize::from(direct.is_ok()), 1);

    let p = state.store.get_portfolio(p.id).await.unwrap();
    assert_eq!(p.balance, dec!(100000) - dec!(1000) + dec!(1300));
    assert!(state.store.get_holding(p.id, "AAPL").await.unwrap().is_none());
    assert_eq!(state.store.list_transactions(p.id).await.unwrap().len(), 2);

    // a rule that lost the race stays pending
    let still_active = state.rules.get(rule.id).await.unwrap().active;
    assert_eq!(still_active, direct.is_ok());
}

#[tokio::test]
async fn listing_failure_fails_the_cycle_only() {
    let settings = common::test_settings();
    let store = Arc::new(FlakyStore::new(settings.starting_balance));
    let prices = Arc::new(StaticPrices::new());
    prices.set("AAPL", dec!(10));
    let state = AppState::new(settings, store.clone(), prices.clone());

    let rule = state.rules.add_rule("alice", "AAPL", "price < 20", Side::Buy, 1).await.unwrap();

    store.rules_down.store(true, Ordering::SeqCst);
    let err = state.scanner().run_cycle().await.unwrap_err();
    assert!(matches!(err, TradingError::StorageUnavailable(_)));

    // the running loop survives failing cycles and picks the rule up once storage is back
    let handle = state.scanner().spawn();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!handle.is_finished());

    store.rules_down.store(false, Ordering::SeqCst);
    let rules = state.rules.clone();
    let filled = wait_until(Duration::from_secs(3), || {
        let rules = rules.clone();
        async move { !rules.get(rule.id).await.unwrap().active }
    })
    .await;
    assert!(filled);

    handle.stop().await;
}

#[tokio::test]
async fn spawned_scanner_stops_gracefully() {
    let (state, prices) = common::test_state();
    prices.set("AAPL", dec!(10));
    let rule = state.rules.add_rule("alice", "AAPL", "price < 20", Side::Buy, 3).await.unwrap();

    let handle = state.scanner().spawn();

    let rules = state.rules.clone();
    let filled = wait_until(Duration::from_secs(3), || {
        let rules = rules.clone();
        async move { !rules.get(rule.id).await.unwrap().active }
    })
    .await;
    assert!(filled);

    tokio::time::timeout(Duration::from_secs(3), handle.stop())
        .await
        .expect("scanner did not stop");

    // nothing fills after stop
    let late = state.rules.add_rule("alice", "AAPL", "price < 20", Side::Buy, 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(state.rules.get(late.id).await.unwrap().active);
}

#[tokio::test]
async fn stop_waits_for_the_cycle_in_flight() {
    let prices = Arc::new(StaticPrices::with_prices([("AAPL", dec!(10))]));
    let entered = Arc::new(AtomicBool::new(false));
    let settings = Settings {
        scan_interval: Duration::from_secs(60),
        price_timeout: Duration::from_secs(2),
        ..common::test_settings()
    };
    let state = common::state_with(
        settings,
        Arc::new(SlowOracle {
            prices,
            delay: Duration::from_millis(300),
            entered: entered.clone(),
        }),
    );
    let rule = state.rules.add_rule("alice", "AAPL", "price < 20", Side::Buy, 2).await.unwrap();

    let handle = state.scanner().spawn();

    let started = wait_until(Duration::from_secs(3), || {
        let entered = entered.clone();
        async move { entered.load(Ordering::SeqCst) }
    })
    .await;
    assert!(started);

    tokio::time::timeout(Duration::from_secs(3), handle.stop())
        .await
        .expect("scanner did not stop");

    let rule = state.rules.get(rule.id).await.unwrap();
    assert!(!rule.active);
    let p = state.store.get_or_create_portfolio("alice").await.unwrap();
    let txns = state.store.list_transactions(p.id).await.unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].rule_id, Some(rule.id));
}
