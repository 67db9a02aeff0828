//! Background evaluation of auto-trade rules.
//!
//! Each cycle lists the active rules, prices every rule's symbol and fills the
//! ones whose condition holds. Rules are processed concurrently and in
//! isolation: a slow oracle, a rejected fill or a storage error on one rule
//! never aborts the rest of the cycle. A rule whose fill fails stays active
//! and is retried on the next cycle.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, StreamExt};
use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::{
    order_executor::OrderExecutor,
    price_oracle::{last_price_within, normalize_symbol, PriceOracle, PriceQuote},
    rule_registry::RuleRegistry,
};
use crate::{
    config::Settings,
    error::{TradingError, TradingResult},
    models::{AutoTradeRule, Transaction},
};

#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub interval: Duration,
    pub price_timeout: Duration,
    pub rule_timeout: Duration,
    pub concurrency: usize,
}

impl From<&Settings> for ScannerSettings {
    fn from(s: &Settings) -> Self {
        Self {
            interval: s.scan_interval,
            price_timeout: s.price_timeout,
            rule_timeout: s.rule_timeout,
            concurrency: s.scan_concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    NotTriggered { price: Decimal },
    PriceUnavailable { reason: String },
    Executed(Transaction),
    // fill failed; the rule stays active
    Failed(TradingError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub executed: usize,
    pub not_triggered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &RuleOutcome) {
        self.scanned += 1;
        match outcome {
            RuleOutcome::NotTriggered { .. } => self.not_triggered += 1,
            RuleOutcome::PriceUnavailable { .. } => self.skipped += 1,
            RuleOutcome::Executed(_) => self.executed += 1,
            RuleOutcome::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Clone)]
pub struct RuleScanner {
    registry: RuleRegistry,
    oracle: Arc<dyn PriceOracle>,
    executor: OrderExecutor,
    settings: ScannerSettings,
    events_tx: broadcast::Sender<String>,
}

impl RuleScanner {
    pub fn new(
        registry: RuleRegistry,
        oracle: Arc<dyn PriceOracle>,
        executor: OrderExecutor,
        settings: ScannerSettings,
        events_tx: broadcast::Sender<String>,
    ) -> Self {
        Self {
            registry,
            oracle,
            executor,
            settings,
            events_tx,
        }
    }

    /// Runs one scan cycle. Only a failure to list the rules is an error.
    pub async fn run_cycle(&self) -> TradingResult<CycleReport> {
        let rules = self.registry.list_active(None).await?;

        let mut report = CycleReport::default();
        if rules.is_empty() {
            return Ok(report);
        }

        tracing::debug!(count = rules.len(), "checking active rules");

        let outcomes: Vec<RuleOutcome> = stream::iter(rules)
            .map(|rule| self.evaluate_rule(rule))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for outcome in &outcomes {
            report.record(outcome);
        }

        if report.executed > 0 {
            let _ = self.events_tx.send("rulesUpdated".to_string());
        }

        Ok(report)
    }

    /// Prices one rule and fills it when its condition holds.
    pub async fn evaluate_rule(&self, rule: AutoTradeRule) -> RuleOutcome {
        let sym = normalize_symbol(&rule.symbol);

        let quote = last_price_within(self.oracle.as_ref(), &sym, self.settings.price_timeout).await;

        let price = match quote {
            PriceQuote::Available(p) => p,
            PriceQuote::Unavailable { reason } => {
                tracing::debug!(rule = %rule.id, symbol = %sym, %reason, "no price, skipping rule this cycle");
                return RuleOutcome::PriceUnavailable { reason };
            }
        };

        if !rule.condition.is_met(price) {
            return RuleOutcome::NotTriggered { price };
        }

        tracing::info!(
            rule = %rule.id,
            symbol = %sym,
            action = %rule.action,
            condition = %rule.condition,
            price = %price,
            "rule triggered"
        );

        let rule = AutoTradeRule { symbol: sym, ..rule };

        match time::timeout(self.settings.rule_timeout, self.executor.execute_rule(&rule, price)).await {
            Ok(Ok(txn)) => RuleOutcome::Executed(txn),
            Ok(Err(e)) => {
                if e.is_rejection() {
                    tracing::warn!(rule = %rule.id, code = e.code(), error = %e, "auto-trade not executed, will retry next cycle");
                } else {
                    tracing::error!(rule = %rule.id, code = e.code(), error = %e, "auto-trade failed, will retry next cycle");
                }
                RuleOutcome::Failed(e)
            }
            Err(_) => {
                let e = TradingError::Timeout(format!("auto-trade for rule {}", rule.id));
                tracing::warn!(rule = %rule.id, error = %e, "auto-trade not executed, will retry next cycle");
                RuleOutcome::Failed(e)
            }
        }
    }

    /// Starts the periodic loop on the runtime.
    pub fn spawn(self) -> ScannerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = time::interval(self.settings.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(interval_ms = self.settings.interval.as_millis() as u64, "rule scanner started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // a cycle always runs to completion before stop is honoured
                        match self.run_cycle().await {
                            Ok(report) if report.scanned > 0 => {
                                tracing::debug!(?report, "scan cycle finished");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!(code = e.code(), error = %e, "scan cycle failed, retrying next tick");
                            }
                        }
                    }
                    res = stop_rx.changed() => {
                        if res.is_err() {
                            break;
                        }
                    }
                }

                if *stop_rx.borrow() {
                    break;
                }
            }

            tracing::info!("rule scanner stopped");
        });

        ScannerHandle { stop_tx, task }
    }
}

/// Owner of a running scanner loop.
pub struct ScannerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScannerHandle {
    /// Signals the loop and waits for the in-flight cycle to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "rule scanner task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
