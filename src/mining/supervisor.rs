//! # Timeout-Supervised Miner
//!
//! Runs the itemset and rule primitives on detached worker threads and waits
//! for them under one wall-clock budget.
//!
//! ## Timeout behavior
//!
//! The supervisor wakes every `poll_interval` (capped at the remaining
//! budget) to log elapsed time. When the budget runs out it raises the
//! shared [`CancellationFlag`], logs a warning and returns an empty rule set.
//! The worker thread is never joined: a primitive that ignores the flag keeps
//! running until it returns on its own and its result is dropped.

use super::matrix::BasketMatrix;
use super::pipeline::EmptyReason;
use super::primitives::{
    AssociationRule, CancellationFlag, FrequentItemsetMiner, RuleDeriver, RuleMetric,
};
use crate::error::{MiningError, Result};
use crate::logging::log_error;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Thresholds for one supervised run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MiningThresholds {
    pub min_support: f64,
    pub min_lift: f64,
    pub min_confidence: f64,
}

/// What a supervised run produced
#[derive(Debug, Clone, Default)]
pub struct MiningReport {
    /// Rules at or above the confidence threshold
    pub rules: Vec<AssociationRule>,
    pub itemset_count: usize,
    /// Rules returned by the deriver before confidence filtering
    pub derived_rule_count: usize,
    /// Set whenever `rules` is empty
    pub empty_reason: Option<EmptyReason>,
    pub elapsed: Duration,
}

impl MiningReport {
    fn empty(reason: EmptyReason, started: Instant) -> Self {
        Self {
            empty_reason: Some(reason),
            elapsed: started.elapsed(),
            ..Self::default()
        }
    }

    pub fn timed_out(&self) -> bool {
        self.empty_reason == Some(EmptyReason::TimedOut)
    }
}

/// Supervises the external mining primitives under a time budget
#[derive(Clone)]
pub struct TimeoutSupervisedMiner {
    miner: Arc<dyn FrequentItemsetMiner>,
    deriver: Arc<dyn RuleDeriver>,
    poll_interval: Duration,
}

impl std::fmt::Debug for TimeoutSupervisedMiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutSupervisedMiner")
            .field("miner", &self.miner.name())
            .field("deriver", &self.deriver.name())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl TimeoutSupervisedMiner {
    pub fn new(
        miner: Arc<dyn FrequentItemsetMiner>,
        deriver: Arc<dyn RuleDeriver>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            miner,
            deriver,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Mine itemsets, derive lift rules and filter them by confidence.
    ///
    /// `budget` covers both primitive calls. Running out of budget is not an
    /// error; a primitive error or panic is.
    pub async fn mine(
        &self,
        matrix: Arc<BasketMatrix>,
        thresholds: MiningThresholds,
        budget: Duration,
    ) -> Result<MiningReport> {
        let started = Instant::now();
        let deadline = started + budget;
        let cancel = CancellationFlag::new();

        info!(
            miner = self.miner.name(),
            items = matrix.num_items(),
            transactions = matrix.num_transactions(),
            density = matrix.density(),
            min_support = thresholds.min_support,
            budget_secs = budget.as_secs_f64(),
            "⛏️ Starting frequent itemset mining"
        );

        let miner = Arc::clone(&self.miner);
        let worker_cancel = cancel.clone();
        let min_support = thresholds.min_support;
        let itemsets = match self
            .supervise(self.miner.name(), deadline, &cancel, move || {
                miner.mine(&matrix, min_support, &worker_cancel)
            })
            .await?
        {
            Some(itemsets) => itemsets,
            None => return Ok(MiningReport::empty(EmptyReason::TimedOut, started)),
        };

        if itemsets.is_empty() {
            warn!(min_support = min_support, "No frequent itemsets found");
            return Ok(MiningReport::empty(EmptyReason::NoItemsets, started));
        }
        let itemset_count = itemsets.len();
        info!(itemsets = itemset_count, "Found frequent itemsets");

        let deriver = Arc::clone(&self.deriver);
        let worker_cancel = cancel.clone();
        let min_lift = thresholds.min_lift;
        let derived = match self
            .supervise(self.deriver.name(), deadline, &cancel, move || {
                deriver.derive(&itemsets, RuleMetric::Lift, min_lift, &worker_cancel)
            })
            .await?
        {
            Some(rules) => rules,
            None => {
                let mut report = MiningReport::empty(EmptyReason::TimedOut, started);
                report.itemset_count = itemset_count;
                return Ok(report);
            }
        };

        let derived_rule_count = derived.len();
        if derived.is_empty() {
            warn!(min_lift = min_lift, "No rules found");
            let mut report = MiningReport::empty(EmptyReason::NoRules, started);
            report.itemset_count = itemset_count;
            return Ok(report);
        }

        let rules: Vec<AssociationRule> = derived
            .into_iter()
            .filter(|rule| rule.confidence >= thresholds.min_confidence)
            .collect();

        info!(
            derived = derived_rule_count,
            kept = rules.len(),
            min_confidence = thresholds.min_confidence,
            "Filtered rules by confidence"
        );

        Ok(MiningReport {
            empty_reason: rules.is_empty().then_some(EmptyReason::BelowConfidence),
            rules,
            itemset_count,
            derived_rule_count,
            elapsed: started.elapsed(),
        })
    }

    /// Run `work` on a detached thread; `Ok(None)` means the deadline passed
    async fn supervise<T, F>(
        &self,
        stage: &str,
        deadline: Instant,
        cancel: &CancellationFlag,
        work: F,
    ) -> Result<Option<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, mut rx) = oneshot::channel();
        let stage_started = Instant::now();

        thread::Builder::new()
            .name(format!("mining-{stage}"))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(work));
                // Receiver is gone once the supervisor has given up
                let _ = tx.send(outcome);
            })
            .map_err(|e| MiningError::Internal(format!("failed to spawn {stage} worker: {e}")))?;

        loop {
            let now = Instant::now();
            if now >= deadline {
                cancel.cancel();
                warn!(
                    stage = stage,
                    elapsed_secs = stage_started.elapsed().as_secs(),
                    hint = "use fewer items or a higher min_support",
                    "⏰ Mining primitive timed out, abandoning worker"
                );
                return Ok(None);
            }

            let wait = self.poll_interval.min(deadline - now);
            match tokio::time::timeout(wait, &mut rx).await {
                Ok(Ok(Ok(result))) => {
                    debug!(
                        stage = stage,
                        elapsed_ms = stage_started.elapsed().as_millis() as u64,
                        "Mining primitive finished"
                    );
                    return result
                        .map(Some)
                        .map_err(|e| match e {
                            MiningError::Primitive { .. } => e,
                            other => MiningError::primitive(stage, other),
                        })
                        .inspect_err(|e| log_error("supervisor", stage, &e.to_string(), None));
                }
                Ok(Ok(Err(payload))) => {
                    let reason = panic_message(payload.as_ref());
                    log_error("supervisor", stage, &reason, Some("worker panicked"));
                    return Err(MiningError::primitive(stage, format!("panicked: {reason}")));
                }
                Ok(Err(_)) => {
                    return Err(MiningError::primitive(
                        stage,
                        "worker exited without reporting a result",
                    ));
                }
                Err(_) => {
                    info!(
                        stage = stage,
                        elapsed_secs = stage_started.elapsed().as_secs(),
                        "⏳ Mining primitive still running"
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
