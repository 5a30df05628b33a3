//! Bounded-concurrency request fan-out
//!
//! Requests are pulled lazily from an iterator and spawned onto the runtime,
//! each holding a semaphore permit for as long as it runs. The producer only
//! pulls the next request once a permit frees up, so an arbitrarily large
//! fan-out never has more than `concurrency` requests in flight or waiting
//! in memory. The call returns after every spawned request has reported.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

use crate::config::DEFAULT_CONCURRENCY;
use crate::observer::{NoopObserver, PurgeObserver};
use crate::stats::StatsCollector;
use crate::{PurgeError, Result};

/// One outbound request, resolved to `Ok(())` on transport-level success
pub type RequestFuture = BoxFuture<'static, Result<()>>;

/// Per-key outcomes of a dispatcher run, one boolean per request
#[derive(Debug, Clone)]
pub struct DispatchResults<K> {
    results: HashMap<K, Vec<bool>>,
}

impl<K: Eq + Hash> Default for DispatchResults<K> {
    fn default() -> Self {
        Self {
            results: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> DispatchResults<K> {
    fn record(&mut self, key: K, success: bool) {
        self.results.entry(key).or_default().push(success);
    }

    pub fn get(&self, key: &K) -> Option<&[bool]> {
        self.results.get(key).map(Vec::as_slice)
    }

    /// Unanimous success: the key has results and none of them failed
    pub fn succeeded(&self, key: &K) -> bool {
        matches!(self.get(key), Some(outcomes) if outcomes.iter().all(|ok| *ok))
    }

    pub fn total_requests(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Clone)]
pub struct ConcurrentDispatcher {
    concurrency: usize,
    stats: StatsCollector,
    observer: Arc<dyn PurgeObserver>,
}

impl Default for ConcurrentDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl ConcurrentDispatcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            stats: StatsCollector::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_stats(mut self, stats: StatsCollector) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PurgeObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every request produced by `requests`, at most `concurrency` at a
    /// time, and collect their outcomes by key.
    ///
    /// Request errors and panics are recorded as `false`; they never abort
    /// sibling requests or escape this call.
    pub async fn run<K, I>(&self, requests: I) -> DispatchResults<K>
    where
        K: Eq + Hash + Display + Send + 'static,
        I: IntoIterator<Item = (K, RequestFuture)>,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut results = DispatchResults::default();

        for (key, request) in requests {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Dispatch semaphore closed");
                    break;
                }
            };

            while let Some(done) = tasks.try_join_next() {
                self.collect(done, &mut results);
            }

            let stats = self.stats.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                let outcome = match AssertUnwindSafe(request).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => Err(PurgeError::Panicked(panic_message(panic.as_ref()))),
                };
                stats.record_request(outcome.is_ok(), started.elapsed().as_secs_f64() * 1000.0);
                (key, outcome)
            });
        }

        while let Some(done) = tasks.join_next().await {
            self.collect(done, &mut results);
        }

        debug!(
            keys = results.len(),
            requests = results.total_requests(),
            "Dispatch run complete"
        );

        results
    }

    fn collect<K>(
        &self,
        done: std::result::Result<(K, Result<()>), JoinError>,
        results: &mut DispatchResults<K>,
    ) where
        K: Eq + Hash + Display,
    {
        match done {
            Ok((key, Ok(()))) => results.record(key, true),
            Ok((key, Err(e))) => {
                let key_label = key.to_string();
                warn!(key = %key_label, error = %e, "Purge request failed");
                self.observer.request_failed(&key_label, &e);
                results.record(key, false);
            }
            // Only reachable if the runtime shuts down mid-dispatch; the key
            // stays absent, which callers treat as failure.
            Err(e) => error!(error = %e, "Purge request task aborted"),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
