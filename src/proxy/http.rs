//! Terminal proxy performing the outbound HTTP call.
//!
//! # Responsibilities
//! - Build the backend URI from a host, the shaped path and the query
//! - Forward method, headers and body
//! - Decode the backend response according to the backend encoding
//!
//! # Design Decisions
//! - Hosts are picked round-robin
//! - Every await races the request context
//! - Non-2xx responses become status-carrying errors
//! - `noop` encoding does not decode; the body is streamed back as-is

use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Method, Request as HttpRequest, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde_json::{Map, Value};

use crate::config::BackendConfig;
use crate::observability::metrics;
use crate::proxy::{
    Context, Metadata, Outcome, Proxy, ProxyError, ProxyFuture, Request, Response, Values,
};

/// Shared outbound HTTP client.
pub type HttpClient = Client<HttpConnector, Body>;

/// Build the default outbound client.
pub fn default_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// How a backend response body is turned into `Response` data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    Json,
    String,
    Noop,
}

impl Decoder {
    /// Pick the decoder for an encoding name; unknown names decode as JSON.
    pub fn for_encoding(encoding: &str) -> Self {
        match encoding {
            "string" => Decoder::String,
            "noop" => Decoder::Noop,
            _ => Decoder::Json,
        }
    }
}

/// Proxy calling one backend over HTTP.
pub struct HttpProxy {
    client: HttpClient,
    hosts: Vec<String>,
    decoder: Decoder,
    max_response_body: usize,
    next_host: AtomicUsize,
}

impl HttpProxy {
    pub fn new(client: HttpClient, backend: &BackendConfig, max_response_body: usize) -> Self {
        Self {
            client,
            hosts: backend.host.clone(),
            decoder: Decoder::for_encoding(&backend.encoding),
            max_response_body,
            next_host: AtomicUsize::new(0),
        }
    }

    fn pick_host(&self) -> Option<&str> {
        if self.hosts.is_empty() {
            return None;
        }
        let index = self.next_host.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        Some(self.hosts[index].as_str())
    }
}

impl Proxy for HttpProxy {
    fn call(&self, ctx: Context, request: Request) -> ProxyFuture {
        let outbound = self
            .pick_host()
            .ok_or_else(|| ProxyError::InvalidRequest("backend has no host".into()))
            .and_then(|host| build_request(host, request));
        let client = self.client.clone();
        let decoder = self.decoder;
        let limit = self.max_response_body;

        Box::pin(async move {
            let outbound = match outbound {
                Ok(req) => req,
                Err(e) => return Outcome::err(e),
            };
            let uri = outbound.uri().clone();

            let response = match ctx.run(client.request(outbound)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    tracing::warn!(uri = %uri, error = %e, "Backend request failed");
                    return Outcome::err(ProxyError::backend(e.to_string()));
                }
                Err(e) => return Outcome::err(e),
            };

            let status = response.status();
            metrics::record_backend_request(status.as_u16());
            if !status.is_success() {
                tracing::debug!(
                    uri = %uri,
                    status = %status,
                    "Backend answered with an error status"
                );
                return Outcome::err(ProxyError::with_status(
                    status,
                    format!("invalid status code {}", status.as_u16()),
                ));
            }

            let (parts, body) = response.into_parts();
            let body = Body::new(body);

            if decoder == Decoder::Noop {
                return Outcome::ok(Response {
                    is_complete: true,
                    metadata: Metadata {
                        headers: header_values(&parts.headers),
                        status_code: status,
                    },
                    io: Some(body),
                    ..Default::default()
                });
            }

            let bytes = match ctx.run(axum::body::to_bytes(body, limit)).await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => return Outcome::err(ProxyError::backend(e.to_string())),
                Err(e) => return Outcome::err(e),
            };

            match decode(decoder, &bytes) {
                Ok(data) => Outcome::ok(Response {
                    data,
                    is_complete: true,
                    metadata: Metadata {
                        headers: Values::new(),
                        status_code: status,
                    },
                    io: None,
                }),
                Err(e) => Outcome::err(e),
            }
        })
    }
}

/// Build the outbound request for `host`.
pub fn build_request(host: &str, request: Request) -> Result<HttpRequest<Body>, ProxyError> {
    let mut url = format!("{}{}", host.trim_end_matches('/'), request.path);
    if !request.query.is_empty() {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, values) in &request.query {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        url.push('?');
        url.push_str(&serializer.finish());
    }

    let uri: Uri = url
        .parse()
        .map_err(|e| ProxyError::InvalidRequest(format!("{url}: {e}")))?;
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

    let mut builder = HttpRequest::builder().method(method).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, values) in &request.headers {
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

    builder
        .body(request.body)
        .map_err(|e| ProxyError::InvalidRequest(e.to_string()))
}

/// Decode a buffered backend body.
pub fn decode(decoder: Decoder, bytes: &[u8]) -> Result<Map<String, Value>, ProxyError> {
    match decoder {
        Decoder::String => {
            let mut data = Map::new();
            data.insert(
                "content".into(),
                Value::String(String::from_utf8_lossy(bytes).into_owned()),
            );
            Ok(data)
        }
        Decoder::Json | Decoder::Noop => {
            match serde_json::from_slice::<Value>(bytes) {
                Ok(Value::Object(data)) => Ok(data),
                Ok(other) => {
                    let mut data = Map::new();
                    data.insert("content".into(), other);
                    Ok(data)
                }
                Err(e) => Err(ProxyError::Decode(e.to_string())),
            }
        }
    }
}

/// Group a header map into canonical multi-valued entries.
pub fn header_values(headers: &axum::http::HeaderMap) -> Values {
    let mut values = Values::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            values
                .entry(canonical_header_key(name.as_str()))
                .or_default()
                .push(value.to_string());
        }
    }
    values
}

/// `content-type` → `Content-Type`.
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}
