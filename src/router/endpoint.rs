//! Endpoint handlers: bind one endpoint configuration to its pipeline.
//!
//! # Responsibilities
//! - Reject requests using a verb other than the configured one
//! - Run the pipeline under the endpoint deadline
//! - Turn the pipeline outcome into an HTTP response
//!
//! # Design Decisions
//! - Render, cache header and forwarded names are resolved once, at build time
//! - The pipeline is raced against the deadline; once the deadline passes the
//!   handler answers without waiting for it
//! - A pipeline that returns nothing after the deadline counts as failed
//! - Error responses are plain text and skip rendering entirely

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::Request as HttpRequest;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};

use crate::config::EndpointConfig;
use crate::observability::metrics;
use crate::proxy::{BoxProxy, Context, Outcome, ProxyError};
use crate::render::{Render, RenderRegistry};
use crate::router::request::{RequestBuilder, DEFAULT_HEADERS_TO_PASS};
use crate::router::{
    gateway_header_value, COMPLETED_HEADER, GATEWAY_HEADER, HEADER_COMPLETE, HEADER_INCOMPLETE,
};

/// Maps an error without its own status code to an HTTP status.
pub type ToHttpStatus = Arc<dyn Fn(&ProxyError) -> StatusCode + Send + Sync>;

/// Every error maps to 500.
pub fn default_to_http_status() -> ToHttpStatus {
    Arc::new(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Builds endpoint handlers sharing renders, request building and error mapping.
#[derive(Clone)]
pub struct HandlerFactory {
    renders: RenderRegistry,
    request_builder: RequestBuilder,
    to_status: ToHttpStatus,
    gateway_header: HeaderValue,
}

impl HandlerFactory {
    pub fn new(
        renders: RenderRegistry,
        request_builder: RequestBuilder,
        version: Option<&str>,
    ) -> Self {
        Self {
            renders,
            request_builder,
            to_status: default_to_http_status(),
            gateway_header: header_value(&gateway_header_value(version)),
        }
    }

    /// Replace the status mapping for errors without a status code.
    pub fn with_status_mapping(mut self, to_status: ToHttpStatus) -> Self {
        self.to_status = to_status;
        self
    }

    pub fn build(&self, endpoint: &EndpointConfig, proxy: BoxProxy) -> EndpointHandler {
        let cache_ttl = endpoint.cache_ttl.as_secs();
        let headers_to_pass = if endpoint.headers_to_pass.is_empty() {
            DEFAULT_HEADERS_TO_PASS.iter().map(|h| h.to_string()).collect()
        } else {
            endpoint.headers_to_pass.clone()
        };

        EndpointHandler {
            inner: Arc::new(HandlerInner {
                endpoint: endpoint.endpoint.clone(),
                method: endpoint.method.to_uppercase(),
                timeout: endpoint.timeout,
                cache_control: (cache_ttl > 0)
                    .then(|| header_value(&format!("public, max-age={cache_ttl}"))),
                query_string: endpoint.query_string.clone(),
                headers_to_pass,
                render: self.renders.resolve(endpoint),
                proxy,
                request_builder: self.request_builder.clone(),
                to_status: self.to_status.clone(),
                gateway_header: self.gateway_header.clone(),
            }),
        }
    }
}

/// HTTP handler for one endpoint.
#[derive(Clone)]
pub struct EndpointHandler {
    inner: Arc<HandlerInner>,
}

struct HandlerInner {
    endpoint: String,
    method: String,
    timeout: Duration,
    cache_control: Option<HeaderValue>,
    query_string: Vec<String>,
    headers_to_pass: Vec<String>,
    render: Render,
    proxy: BoxProxy,
    request_builder: RequestBuilder,
    to_status: ToHttpStatus,
    gateway_header: HeaderValue,
}

impl EndpointHandler {
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let started = Instant::now();
        let method = request.method().clone();
        let response = self.inner.respond(request).await;
        metrics::record_request(
            &self.inner.endpoint,
            method.as_str(),
            response.status().as_u16(),
            started,
        );
        response
    }
}

impl HandlerInner {
    async fn respond(&self, request: HttpRequest) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert(GATEWAY_HEADER, self.gateway_header.clone());

        if !request.method().as_str().eq_ignore_ascii_case(&self.method) {
            tracing::debug!(
                endpoint = %self.endpoint,
                method = %request.method(),
                expected = %self.method,
                "Method not allowed"
            );
            headers.insert(COMPLETED_HEADER, HeaderValue::from_static(HEADER_INCOMPLETE));
            return with_headers(StatusCode::METHOD_NOT_ALLOWED.into_response(), headers);
        }

        let (parts, body) = request.into_parts();
        let parent = parts.extensions.get::<Context>().cloned().unwrap_or_default();
        let ctx = parent.with_timeout(self.timeout);
        let _cancel = ctx.cancel_on_drop();

        let request =
            self.request_builder
                .build(&parts, body, &self.query_string, &self.headers_to_pass);

        let Outcome {
            response,
            mut error,
        } = tokio::select! {
            biased;
            outcome = self.proxy.call(ctx.clone(), request) => outcome,
            _ = ctx.done() => Outcome::empty(),
        };

        if ctx.is_done() && error.is_none() {
            error = Some(ProxyError::Internal);
        }

        match response.as_ref().filter(|r| !r.data.is_empty()) {
            Some(usable) => {
                if usable.is_complete {
                    headers.insert(COMPLETED_HEADER, HeaderValue::from_static(HEADER_COMPLETE));
                    if let Some(cache_control) = &self.cache_control {
                        headers.insert(CACHE_CONTROL, cache_control.clone());
                    }
                } else {
                    headers.insert(COMPLETED_HEADER, HeaderValue::from_static(HEADER_INCOMPLETE));
                }
                append_values(&mut headers, &usable.metadata.headers);
            }
            None => {
                headers.insert(COMPLETED_HEADER, HeaderValue::from_static(HEADER_INCOMPLETE));
                if let Some(error) = error.take() {
                    let status = error
                        .status_code()
                        .unwrap_or_else(|| (self.to_status)(&error));
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        status = %status,
                        error = %error,
                        "Pipeline failed"
                    );
                    return with_headers(error_response(status, &error), headers);
                }
            }
        }

        if let Some(error) = &error {
            tracing::debug!(
                endpoint = %self.endpoint,
                error = %error,
                "Rendering partial response"
            );
        }

        with_headers((self.render)(&parts.headers, response), headers)
    }
}

/// Plain-text error response: the message and a trailing newline.
pub fn error_response(status: StatusCode, error: &ProxyError) -> HttpResponse {
    (
        status,
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from(format!("{error}\n")),
    )
        .into_response()
}

/// Add `headers` to `response`, leaving alone the names the response already set.
fn with_headers(mut response: HttpResponse, headers: HeaderMap) -> HttpResponse {
    for name in headers.keys() {
        if response.headers().contains_key(name) {
            if !is_own(name) {
                continue;
            }
            response.headers_mut().remove(name);
        }
        for value in headers.get_all(name) {
            response.headers_mut().append(name.clone(), value.clone());
        }
    }
    response
}

/// Headers the handler owns even when a render already set them.
fn is_own(name: &HeaderName) -> bool {
    *name == GATEWAY_HEADER || *name == COMPLETED_HEADER
}

fn append_values(headers: &mut HeaderMap, values: &crate::proxy::Values) {
    for (name, values) in values {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
}
