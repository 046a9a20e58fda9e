//! Pipeline value types.
//!
//! # Design Decisions
//! - Multi-valued maps are `BTreeMap`s so serialized output is deterministic
//! - The request body is a single-consumption stream; fan-out replays a buffer
//! - `Outcome` keeps the response and the error side by side because a partial
//!   response may travel together with the error that made it partial

use std::collections::BTreeMap;

use axum::body::{Body, Bytes};
use axum::http::StatusCode;
use serde_json::{Map, Value};

use crate::proxy::error::ProxyError;

/// Multi-valued string map used for query strings and headers.
pub type Values = BTreeMap<String, Vec<String>>;

/// Path parameters extracted by the router adapter.
pub type Params = BTreeMap<String, String>;

/// The internal request flowing through a pipeline.
#[derive(Debug, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: Values,
    pub params: Params,
    pub headers: Values,
    pub body: Body,
}

impl Request {
    /// Take the body out, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Copy every field except the body, which is replaced by `body`.
    pub fn replicate(&self, body: Body) -> Request {
        Request {
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            params: self.params.clone(),
            headers: self.headers.clone(),
            body,
        }
    }

    /// Copy with a replay of an already buffered body.
    pub fn replay(&self, body: &Bytes) -> Request {
        self.replicate(Body::from(body.clone()))
    }
}

/// Backend response metadata.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub headers: Values,
    pub status_code: StatusCode,
}

/// The internal response produced by a pipeline.
#[derive(Debug, Default)]
pub struct Response {
    pub data: Map<String, Value>,
    pub is_complete: bool,
    pub metadata: Metadata,
    /// Raw backend stream, used by passthrough renders.
    pub io: Option<Body>,
}

impl Response {
    /// A complete response carrying `data`.
    pub fn complete(data: Map<String, Value>) -> Self {
        Self {
            data,
            is_complete: true,
            ..Default::default()
        }
    }
}

/// What a proxy call produced: a response, an error, both or neither.
#[derive(Debug, Default)]
pub struct Outcome {
    pub response: Option<Response>,
    pub error: Option<ProxyError>,
}

impl Outcome {
    pub fn ok(response: Response) -> Self {
        Self {
            response: Some(response),
            error: None,
        }
    }

    pub fn err(error: ProxyError) -> Self {
        Self {
            response: None,
            error: Some(error),
        }
    }

    /// A response that is usable but came with an error.
    pub fn partial(response: Response, error: ProxyError) -> Self {
        Self {
            response: Some(response),
            error: Some(error),
        }
    }

    /// Neither response nor error.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}
