//! Named loading slots with timeout, bounded retry and cancellation.
//!
//! A [`LoadingTracker`] runs async operations under caller-chosen keys and
//! records, per key, whether the operation is loading, whether it completed,
//! its last error and how many retries the current call chain has used.
//! Keys that were never used read as [`OperationState::default`].
//!
//! Every attempt gets its own [`CancelHandle`], derived from a root handle
//! owned by the tracker. [`LoadingTracker::abort_all`] cancels the root, which
//! also happens when the tracker is dropped, so work an operation spawned off
//! with its handle is stopped together with its owner. Finished attempts
//! leave nothing behind.

use anyhow::Result;
use log::{debug, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::cancel::{CancelHandle, DEFAULT_CANCEL_REASON, is_cancellation};
use crate::config::LoadingConfig;

/// Reason recorded on a handle whose attempt ran out of time.
pub const TIMEOUT_REASON: &str = "Operation timed out";

const FALLBACK_ERROR: &str = "Operation failed";

/// Observable state of one named operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationState {
    pub loading: bool,
    pub error: Option<String>,
    pub completed: bool,
    pub retry_count: u32,
}

/// Per-call overrides for [`LoadingTracker::execute_with_loading`].
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    /// Retry budget for this call chain; the tracker default when unset.
    pub retries: Option<u32>,
    pub show_loading: bool,
    /// Per-attempt timeout; the tracker default when unset, disabled when
    /// zero.
    pub operation_timeout: Option<Duration>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            retries: None,
            show_loading: true,
            operation_timeout: None,
        }
    }
}

impl ExecuteOptions {
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn hide_loading(mut self) -> Self {
        self.show_loading = false;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

pub struct LoadingTracker {
    config: LoadingConfig,
    states: Mutex<HashMap<String, OperationState>>,
    root: Mutex<CancelHandle>,
    in_flight: AtomicUsize,
}

impl Default for LoadingTracker {
    fn default() -> Self {
        Self::new(LoadingConfig::default())
    }
}

impl LoadingTracker {
    pub fn new(config: LoadingConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
            root: Mutex::new(CancelHandle::new()),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &LoadingConfig {
        &self.config
    }

    /// Runs `operation` under `key`.
    ///
    /// Non-cancellation failures are retried after `retry_delay` until the
    /// call's retry budget is used up. A timeout cancels the attempt's
    /// handle and is not retried.
    pub async fn execute_with_loading<F, Fut, T>(
        &self,
        key: &str,
        operation: F,
        options: ExecuteOptions,
    ) -> Result<T>
    where
        F: Fn(CancelHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retries = options.retries.unwrap_or(self.config.max_retries);
        let timeout = options.operation_timeout.unwrap_or(self.config.timeout);

        if self.is_loading(key) {
            warn!(
                "{}: started while a previous call is still loading, state will be shared",
                key
            );
        }

        let _guard = options.show_loading.then(|| LoadingGuard {
            tracker: self,
            key: key.to_string(),
        });

        let mut used = 0;
        loop {
            self.update(key, |state| {
                state.error = None;
                state.completed = false;
                if options.show_loading {
                    state.loading = true;
                }
            });

            let (handle, in_flight) = self.register();
            let outcome = run_attempt(&operation, &handle, timeout).await;
            drop(in_flight);

            let error = match outcome {
                Ok(value) => {
                    self.update(key, |state| {
                        state.completed = true;
                        state.retry_count = 0;
                    });
                    return Ok(value);
                }
                Err(e) => e,
            };

            let message = error.to_string();
            self.update(key, |state| {
                state.error = Some(if message.is_empty() {
                    FALLBACK_ERROR.to_string()
                } else {
                    message
                });
            });

            if is_cancellation(&error) {
                debug!("{}: cancelled ({}), not retrying", key, error);
                return Err(error);
            }

            if used >= retries {
                debug!("{}: failed after {} attempts: {}", key, used + 1, error);
                return Err(error);
            }

            used += 1;
            self.update(key, |state| state.retry_count = used);
            warn!(
                "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                key,
                used,
                retries + 1,
                error,
                self.config.retry_delay.as_millis()
            );

            if let Err(aborted) = self.retry_delay().await {
                let message = aborted.to_string();
                self.update(key, |state| state.error = Some(message));
                return Err(aborted);
            }
        }
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.state(key).loading
    }

    pub fn error(&self, key: &str) -> Option<String> {
        self.state(key).error
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.state(key).completed
    }

    pub fn retry_count(&self, key: &str) -> u32 {
        self.state(key).retry_count
    }

    /// State of `key`; the default state when the key was never used.
    pub fn state(&self, key: &str) -> OperationState {
        self.lock_states().get(key).cloned().unwrap_or_default()
    }

    /// Snapshot of every known key.
    pub fn loading_states(&self) -> HashMap<String, OperationState> {
        self.lock_states().clone()
    }

    /// Number of attempts and retry waits currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Cancels every handle handed out so far. Later calls get handles
    /// derived from a fresh root.
    pub fn abort_all(&self) {
        let root = std::mem::take(&mut *self.lock_root());
        let pending = self.in_flight();
        if pending > 0 {
            debug!("Aborting {} pending operations", pending);
        }
        root.cancel(DEFAULT_CANCEL_REASON);
    }

    fn register(&self) -> (CancelHandle, InFlight<'_>) {
        let handle = self.lock_root().child();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        (
            handle,
            InFlight {
                counter: &self.in_flight,
            },
        )
    }

    /// Waits out the retry delay. Aborting the tracker ends the wait.
    async fn retry_delay(&self) -> Result<()> {
        let (handle, _in_flight) = self.register();
        tokio::select! {
            biased;
            _ = handle.cancelled() => Err(handle.to_error().into()),
            _ = tokio::time::sleep(self.config.retry_delay) => Ok(()),
        }
    }

    fn update(&self, key: &str, f: impl FnOnce(&mut OperationState)) {
        let mut states = self.lock_states();
        f(states.entry(key.to_string()).or_default());
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<String, OperationState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_root(&self) -> MutexGuard<'_, CancelHandle> {
        self.root.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for LoadingTracker {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Races one attempt against its handle and the timeout.
async fn run_attempt<F, Fut, T>(operation: &F, handle: &CancelHandle, timeout: Duration) -> Result<T>
where
    F: Fn(CancelHandle) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let work = operation(handle.clone());
    let deadline = async {
        if timeout.is_zero() {
            std::future::pending::<()>().await
        } else {
            tokio::time::sleep(timeout).await
        }
    };

    tokio::select! {
        biased;
        _ = handle.cancelled() => Err(handle.to_error().into()),
        result = work => result,
        _ = deadline => {
            handle.cancel(TIMEOUT_REASON);
            Err(handle.to_error().into())
        }
    }
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Clears the loading flag when a call chain ends, including when the
/// caller drops the future mid-flight.
struct LoadingGuard<'a> {
    tracker: &'a LoadingTracker,
    key: String,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.tracker.update(&self.key, |state| state.loading = false);
    }
}
