//! Batch check handler implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use rechk_domain::cache::{CacheKey, ResultCache};
use rechk_domain::checker::{CheckOptions, CheckOutcome, RegexChecker};
use tracing::{debug, warn};

use super::singleflight::{Singleflight, SingleflightGuard, SingleflightSlot};
use super::types::{
    BatchCheckItemResult, BatchCheckRequest, BatchCheckResponse, EntryOutcome, EntryRejection,
    PatternEntry,
};

/// Handler for batch pattern checks.
///
/// Every entry goes through the same steps: rejected entries short-circuit,
/// cache hits are served directly, and misses run the checker under a
/// timeout. Definitive results are cached.
///
/// Identical entries are executed once, both within a batch and across
/// concurrent batches (singleflight).
pub struct BatchCheckHandler<C>
where
    C: RegexChecker,
{
    checker: Arc<C>,
    cache: Arc<ResultCache>,
    singleflight: Arc<Singleflight<CacheKey, CheckOutcome>>,
    options: CheckOptions,
}

impl<C> BatchCheckHandler<C>
where
    C: RegexChecker + 'static,
{
    /// Creates a new batch check handler with default check options.
    pub fn new(checker: Arc<C>, cache: Arc<ResultCache>) -> Self {
        Self {
            checker,
            cache,
            singleflight: Arc::new(Singleflight::new()),
            options: CheckOptions::default(),
        }
    }

    /// Sets the options (timeout) passed to every check.
    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    pub fn checker(&self) -> &Arc<C> {
        &self.checker
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    /// Executes a batch check request.
    ///
    /// The results are returned in the same order as the request entries.
    /// Individual failures only affect their own entry.
    pub async fn check(&self, request: BatchCheckRequest) -> BatchCheckResponse {
        let evicted = self.cache.maybe_trim();
        if evicted > 0 {
            debug!(evicted, remaining = self.cache.len(), "trimmed result cache");
        }

        // Intra-batch deduplication: one future per distinct cache key.
        let mut unique_entries: Vec<(&PatternEntry, CacheKey)> = Vec::new();
        let mut key_to_index: HashMap<CacheKey, usize> = HashMap::new();
        let mut position_to_unique: Vec<Result<usize, EntryRejection>> = Vec::with_capacity(request.len());

        for item in &request.items {
            match &item.entry {
                Ok(entry) => {
                    let key = entry.cache_key();
                    let unique_index = *key_to_index.entry(key.clone()).or_insert_with(|| {
                        unique_entries.push((entry, key));
                        unique_entries.len() - 1
                    });
                    position_to_unique.push(Ok(unique_index));
                }
                Err(rejection) => {
                    debug!(key = %item.key, reason = %rejection, "entry rejected");
                    position_to_unique.push(Err(rejection.clone()));
                }
            }
        }

        let unique_outcomes: Vec<EntryOutcome> = join_all(
            unique_entries
                .iter()
                .map(|(entry, key)| self.resolve(entry, key.clone())),
        )
        .await;

        let results = request
            .items
            .iter()
            .zip(position_to_unique)
            .map(|(item, unique)| BatchCheckItemResult {
                key: item.key.clone(),
                outcome: match unique {
                    Ok(idx) => unique_outcomes[idx].clone(),
                    Err(rejection) => EntryOutcome::Rejected(rejection),
                },
            })
            .collect();

        BatchCheckResponse { results }
    }

    /// Serves an entry from the cache or runs it through singleflight.
    async fn resolve(&self, entry: &PatternEntry, key: CacheKey) -> EntryOutcome {
        if let Some(result) = self.cache.get(&key) {
            return EntryOutcome::Cached(result);
        }
        EntryOutcome::Checked(self.execute_check_with_singleflight(entry, key).await)
    }

    /// If another task is already checking this key, wait for its outcome.
    /// Otherwise run the checker and broadcast the outcome to any waiters.
    async fn execute_check_with_singleflight(
        &self,
        entry: &PatternEntry,
        key: CacheKey,
    ) -> CheckOutcome {
        match self.singleflight.acquire(key.clone()) {
            SingleflightSlot::Follower(mut receiver) => match receiver.recv().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // The leader went away without an answer (or answered
                    // before we subscribed). Its result may be cached by now.
                    if let Some(result) = self.cache.get(&key) {
                        return CheckOutcome::Completed(result);
                    }
                    Box::pin(self.execute_check_with_singleflight(entry, key)).await
                }
            },
            SingleflightSlot::Leader(sender) => {
                let guard = SingleflightGuard::new(&self.singleflight, key.clone());

                let outcome = self.run_checker(entry, &key).await;
                if let CheckOutcome::Completed(result) = &outcome {
                    self.cache.insert(key, result.clone());
                }

                // No receivers is fine.
                let _ = sender.send(outcome.clone());
                guard.complete();

                outcome
            }
        }
    }

    /// Runs the checker under the configured timeout and records metrics.
    async fn run_checker(&self, entry: &PatternEntry, key: &CacheKey) -> CheckOutcome {
        let start = Instant::now();
        let check = self
            .checker
            .check(&entry.pattern, &entry.modifier, &self.options);

        let outcome = match tokio::time::timeout(self.options.timeout, check).await {
            Ok(Ok(result)) => CheckOutcome::Completed(result),
            Ok(Err(err)) => CheckOutcome::from(err),
            Err(_) => CheckOutcome::TimedOut,
        };

        metrics::histogram!("rechk_check_duration_seconds").record(start.elapsed().as_secs_f64());
        metrics::counter!("rechk_checks_total", "outcome" => outcome.label()).increment(1);

        match &outcome {
            CheckOutcome::Completed(result) => {
                debug!(key = %key, status = %result.status, checker = self.checker.name(), "check completed");
            }
            CheckOutcome::TimedOut => {
                warn!(
                    key = %key,
                    checker = self.checker.name(),
                    timeout_ms = self.options.timeout.as_millis() as u64,
                    "check timed out"
                );
            }
            CheckOutcome::Failed(message) => {
                warn!(key = %key, checker = self.checker.name(), error = %message, "check failed");
            }
        }

        outcome
    }

    /// Returns (total_entries, unique_checks) for a request.
    pub fn dedup_stats(&self, request: &BatchCheckRequest) -> (usize, usize) {
        let mut seen: HashSet<CacheKey> = HashSet::with_capacity(request.len());
        for item in &request.items {
            if let Ok(entry) = &item.entry {
                seen.insert(entry.cache_key());
            }
        }
        (request.len(), seen.len())
    }
}

/// Registers batch handler metrics descriptions.
pub fn register_batch_metrics() {
    metrics::describe_counter!(
        "rechk_checks_total",
        "Total number of checker invocations by outcome"
    );
    metrics::describe_histogram!(
        "rechk_check_duration_seconds",
        metrics::Unit::Seconds,
        "Time spent in the checker per invocation"
    );
}
