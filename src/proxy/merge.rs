//! Fan-out across several backends with merged responses.
//!
//! # Responsibilities
//! - Call every backend stack of an endpoint concurrently
//! - Merge the `data` of each response in arrival order
//! - Report completeness only when every backend answered in time
//!
//! # Design Decisions
//! - Partial data is a success mode: what arrived before the deadline is returned
//! - Errors travel next to the partial response
//! - Calls still pending at the deadline are dropped

use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::proxy::{
    buffer_body, BoxProxy, Context, Outcome, Proxy, ProxyError, ProxyFuture, Request, Response,
};

/// Combines several backend stacks into one proxy.
#[derive(Debug, Clone)]
pub struct MergeMiddleware {
    max_buffered_body: usize,
}

impl MergeMiddleware {
    pub fn new(max_buffered_body: usize) -> Self {
        Self { max_buffered_body }
    }

    /// Wrap every backend stack into a single merging proxy.
    pub fn wrap_all(&self, backends: Vec<BoxProxy>) -> BoxProxy {
        Arc::new(MergeProxy {
            backends,
            max_buffered_body: self.max_buffered_body,
        })
    }
}

struct MergeProxy {
    backends: Vec<BoxProxy>,
    max_buffered_body: usize,
}

impl Proxy for MergeProxy {
    fn call(&self, ctx: Context, mut request: Request) -> ProxyFuture {
        let backends = self.backends.clone();
        let limit = self.max_buffered_body;

        Box::pin(async move {
            let body = match buffer_body(&ctx, request.take_body(), limit).await {
                Ok(body) => body,
                Err(e) => return Outcome::err(e),
            };

            let mut pending: FuturesUnordered<_> = backends
                .iter()
                .map(|backend| backend.call(ctx.clone(), request.replay(&body)))
                .collect();

            let mut merged = Response {
                is_complete: true,
                ..Default::default()
            };
            let mut answered = 0;
            let mut errors = Vec::new();

            loop {
                tokio::select! {
                    biased;
                    next = pending.next() => match next {
                        Some(outcome) => {
                            if let Some(e) = outcome.error {
                                merged.is_complete = false;
                                errors.push(e);
                            }
                            if let Some(response) = outcome.response {
                                answered += 1;
                                merged.is_complete &= response.is_complete;
                                merged.data.extend(response.data);
                            }
                        }
                        None => break,
                    },
                    _ = ctx.done() => {
                        tracing::debug!(
                            pending = pending.len(),
                            "Merge deadline reached, returning partial response"
                        );
                        merged.is_complete = false;
                        errors.push(ctx.err().unwrap_or(ProxyError::Cancelled));
                        break;
                    }
                }
            }

            let error = match errors.len() {
                0 => None,
                1 => errors.pop(),
                _ => Some(ProxyError::Merged(errors)),
            };

            match (answered, error) {
                (0, Some(e)) => Outcome::err(e),
                (_, Some(e)) => Outcome::partial(merged, e),
                (_, None) => Outcome::ok(merged),
            }
        })
    }
}
