//! Cooperative cancellation handles.
//!
//! A [`CancelHandle`] is handed to in-flight work (HTTP requests, orchestrated
//! operations). Triggering it records a reason and wakes every task awaiting
//! [`CancelHandle::cancelled`].

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::http::ApiError;

/// Reason used when a handle is triggered without a more specific cause.
pub const DEFAULT_CANCEL_REASON: &str = "Operation aborted";

/// Cloneable cancellation handle carrying the reason it was triggered with.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
    /// Reason of the handle this one was derived from.
    inherited: Option<Arc<OnceLock<String>>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a handle that is cancelled together with this one but can
    /// also be cancelled on its own. Dropping every clone of the child
    /// detaches it from the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            reason: Arc::new(OnceLock::new()),
            inherited: Some(Arc::clone(&self.reason)),
        }
    }

    /// Triggers the handle. The first reason wins; later calls are no-ops.
    pub fn cancel(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<String> {
        if !self.is_cancelled() {
            return None;
        }
        let reason = self
            .reason
            .get()
            .or_else(|| self.inherited.as_ref().and_then(|r| r.get()));
        Some(
            reason
                .cloned()
                .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string()),
        )
    }

    /// Completes once the handle has been triggered.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Builds the error reported for work stopped by this handle.
    pub fn to_error(&self) -> Cancelled {
        Cancelled {
            reason: self
                .reason()
                .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string()),
        }
    }
}

/// Work was stopped by its cancellation handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Operation cancelled: {reason}")]
pub struct Cancelled {
    pub reason: String,
}

/// Checks whether any error in the chain is a cancellation.
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.downcast_ref::<Cancelled>().is_some()
            || cause
                .downcast_ref::<ApiError>()
                .is_some_and(ApiError::is_cancellation)
    })
}
