//! Batch orchestration: pulls pending listings from a store, looks each one
//! up with the price tracker and records the verdict.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    domain::{evaluate, Decision, EngineConfig, Isbn, ProductSnapshot},
    infra::{
        store::{ListingStore, StoreError},
        tracker::{minutes_from_datetime, CacheStatus, TrackerClient, TrackerError},
    },
};

/// Pause between tracker lookups, keeping the token bucket from draining.
pub const DEFAULT_LOOKUP_DELAY: Duration = Duration::from_millis(1_500);

/// Anything that can produce a snapshot for an identifier. `Ok(None)` means
/// the tracker knows nothing about it.
pub trait SnapshotSource {
    fn fetch_snapshot(
        &self,
        isbn: &Isbn,
    ) -> impl Future<Output = Result<Option<ProductSnapshot>, TrackerError>> + Send;
}

impl SnapshotSource for TrackerClient {
    async fn fetch_snapshot(&self, isbn: &Isbn) -> Result<Option<ProductSnapshot>, TrackerError> {
        let payload = self.get_snapshot(isbn).await?;
        if payload.status == CacheStatus::Stale {
            warn!(identifier = %isbn, "evaluating against stale snapshot");
        }
        Ok(payload.data)
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to read or write listings: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub evaluated: usize,
    pub buy: usize,
    pub review: usize,
    pub reject: usize,
    /// Lookups that failed for reasons other than rate limiting.
    pub failed: usize,
    /// Set when the tracker rate-limited us and the batch stopped early.
    pub aborted: bool,
}

impl BatchReport {
    fn count(&mut self, decision: Decision) {
        self.evaluated += 1;
        match decision {
            Decision::Buy => self.buy += 1,
            Decision::Review => self.review += 1,
            Decision::Reject => self.reject += 1,
        }
    }
}

pub struct BatchRunner {
    config: EngineConfig,
    delay: Duration,
}

impl BatchRunner {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            delay: DEFAULT_LOOKUP_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluates every pending listing, one lookup at a time.
    ///
    /// `now` supplies the evaluation time for each item. Items whose lookup
    /// fails stay pending for the next run.
    pub async fn run<S, T, N>(
        &self,
        source: &S,
        store: &mut T,
        mut now: N,
    ) -> Result<BatchReport, BatchError>
    where
        S: SnapshotSource,
        T: ListingStore,
        N: FnMut() -> OffsetDateTime,
    {
        let pending = store.pending_listings()?;
        info!(pending = pending.len(), "starting evaluation batch");

        let mut report = BatchReport::default();
        for (index, listing) in pending.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let snapshot = match source.fetch_snapshot(&listing.identifier).await {
                Ok(snapshot) => snapshot,
                Err(error) if error.is_rate_limited() => {
                    warn!(identifier = %listing.identifier, %error, "rate limited; stopping batch");
                    report.aborted = true;
                    break;
                }
                Err(error) => {
                    warn!(identifier = %listing.identifier, %error, "lookup failed; leaving listing pending");
                    report.failed += 1;
                    continue;
                }
            };

            let evaluated_at = now();
            let result = evaluate(
                listing,
                snapshot.as_ref(),
                minutes_from_datetime(evaluated_at),
                &self.config,
            );
            store.record_evaluation(&result, evaluated_at)?;
            info!(
                identifier = %result.identifier,
                decision = %result.decision,
                reason = %result.reason,
                "recorded evaluation"
            );
            report.count(result.decision);
        }

        info!(
            evaluated = report.evaluated,
            buy = report.buy,
            review = report.review,
            reject = report.reject,
            failed = report.failed,
            aborted = report.aborted,
            "evaluation batch finished"
        );
        Ok(report)
    }
}
