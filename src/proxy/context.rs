//! Request-scoped execution context.
//!
//! # Responsibilities
//! - Carry the request deadline through every pipeline stage
//! - Propagate cancellation from parent to child contexts
//! - Let stages race their I/O against the context becoming done
//!
//! # Design Decisions
//! - Cancellation uses `tokio_util::sync::CancellationToken` (parent → child only)
//! - A zero timeout adds no deadline; the parent deadline still applies
//! - Children never outlive their parent's deadline

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::proxy::error::ProxyError;

/// A cancellable, deadline-bound execution context.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A root context: never cancelled, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child context whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = if timeout.is_zero() {
            self.deadline
        } else {
            let local = Instant::now() + timeout;
            Some(match self.deadline {
                Some(parent) => parent.min(local),
                None => local,
            })
        };

        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    /// Derive a child context that can be cancelled independently.
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel this context when the returned guard is dropped.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ProxyError> {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(ProxyError::DeadlineExceeded)
        } else if self.token.is_cancelled() {
            Some(ProxyError::Cancelled)
        } else {
            None
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Drive `fut` until it completes or the context is done, whichever comes first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ProxyError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            out = fut => Ok(out),
            _ = self.done() => Err(self.err().unwrap_or(ProxyError::Cancelled)),
        }
    }
}
