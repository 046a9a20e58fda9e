//! Hedged backend calls.
//!
//! # Responsibilities
//! - Issue `concurrent_calls` identical calls to the wrapped proxy
//! - Return the first call that finishes without error
//! - When every call fails, return the failure that arrived last
//!
//! # Design Decisions
//! - `concurrent_calls == 1` returns the wrapped proxy untouched
//! - The request body is buffered once (bounded) and replayed to every call
//! - Calls run as spawned tasks; after a winner is found the rest are left to
//!   finish on their own and their results are dropped. They still observe the
//!   shared context, so the request scope ending stops them.
//! - Arrival order decides the winner, never launch order

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::BackendConfig;
use crate::observability::metrics;
use crate::proxy::{
    buffer_body, BoxProxy, Context, Middleware, Outcome, Proxy, ProxyError, ProxyFuture, Request,
};

/// Middleware issuing redundant calls to cut tail latency.
#[derive(Debug, Clone)]
pub struct ConcurrentMiddleware {
    calls: usize,
    timeout: Duration,
    max_buffered_body: usize,
}

impl ConcurrentMiddleware {
    pub fn new(backend: &BackendConfig, max_buffered_body: usize) -> Self {
        Self {
            calls: backend.concurrent_calls.max(1),
            timeout: backend.timeout,
            max_buffered_body,
        }
    }
}

impl Middleware for ConcurrentMiddleware {
    fn wrap(&self, next: BoxProxy) -> BoxProxy {
        if self.calls <= 1 {
            return next;
        }
        Arc::new(ConcurrentProxy {
            calls: self.calls,
            timeout: self.timeout,
            max_buffered_body: self.max_buffered_body,
            next,
        })
    }
}

struct ConcurrentProxy {
    calls: usize,
    timeout: Duration,
    max_buffered_body: usize,
    next: BoxProxy,
}

impl Proxy for ConcurrentProxy {
    fn call(&self, ctx: Context, mut request: Request) -> ProxyFuture {
        let calls = self.calls;
        let limit = self.max_buffered_body;
        let next = self.next.clone();
        let ctx = ctx.with_timeout(self.timeout);

        Box::pin(async move {
            let body = match buffer_body(&ctx, request.take_body(), limit).await {
                Ok(body) => body,
                Err(e) => return Outcome::err(e),
            };

            let (tx, mut rx) = mpsc::channel::<Outcome>(calls);
            for _ in 0..calls {
                let tx = tx.clone();
                let next = next.clone();
                let ctx = ctx.clone();
                let request = request.replay(&body);
                tokio::spawn(async move {
                    let outcome = next.call(ctx, request).await;
                    // The receiver is gone once a winner was returned.
                    let _ = tx.send(outcome).await;
                });
            }
            drop(tx);

            let mut last_failure = None;
            loop {
                tokio::select! {
                    biased;
                    received = rx.recv() => match received {
                        Some(outcome) if !outcome.is_err() => {
                            metrics::record_hedged_call("success");
                            return outcome;
                        }
                        Some(outcome) => last_failure = Some(outcome),
                        None => break,
                    },
                    _ = ctx.done() => {
                        metrics::record_hedged_call("cancelled");
                        return Outcome::err(ctx.err().unwrap_or(ProxyError::Cancelled));
                    }
                }
            }

            metrics::record_hedged_call("failure");
            last_failure.unwrap_or_else(|| Outcome::err(ProxyError::Internal))
        })
    }
}
