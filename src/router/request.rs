//! Inbound HTTP request → pipeline `Request`.
//!
//! # Responsibilities
//! - Select the query parameters and headers an endpoint forwards
//! - Stamp `X-Forwarded-For` and `User-Agent`
//! - Hand path parameters over through a pluggable extractor
//!
//! # Design Decisions
//! - `"*"` forwards everything; otherwise only listed names that carry values
//! - Listed header names are kept as written in the configuration
//! - Path parameter keys are title-cased (`id` → `Id`) so URL patterns keep
//!   using the `{{.Id}}` form

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::HeaderName;

use crate::proxy::http::header_values;
use crate::proxy::{Params, Request, Values};

/// Forward every query parameter or header.
pub const WILDCARD: &str = "*";

/// Headers forwarded when an endpoint lists none.
pub const DEFAULT_HEADERS_TO_PASS: &[&str] = &["Content-Type"];

/// Raw path parameters captured by the engine, in pattern order.
#[derive(Debug, Clone, Default)]
pub struct PathParams(pub Vec<(String, String)>);

/// Pulls path parameters out of an inbound request.
pub trait ParamExtractor: Send + Sync {
    fn extract(&self, parts: &Parts) -> Params;
}

/// Extractor for engines without path parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParams;

impl ParamExtractor for NoParams {
    fn extract(&self, _parts: &Parts) -> Params {
        Params::new()
    }
}

/// Reads the `PathParams` extension and title-cases the keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathParamsExtractor;

impl ParamExtractor for PathParamsExtractor {
    fn extract(&self, parts: &Parts) -> Params {
        parts
            .extensions
            .get::<PathParams>()
            .map(|params| {
                params
                    .0
                    .iter()
                    .map(|(key, value)| (title_case(key), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Upper-case the first letter of every word; words are split on anything
/// that is not a letter, digit or underscore.
pub fn title_case(key: &str) -> String {
    let mut boundary = true;
    key.chars()
        .map(|c| {
            let out = if boundary { c.to_ascii_uppercase() } else { c };
            boundary = !(c.is_alphanumeric() || c == '_');
            out
        })
        .collect()
}

/// Builds pipeline requests from inbound HTTP requests.
#[derive(Clone)]
pub struct RequestBuilder {
    params: Arc<dyn ParamExtractor>,
    user_agent: String,
}

impl RequestBuilder {
    pub fn new(params: Arc<dyn ParamExtractor>, version: Option<&str>) -> Self {
        Self {
            params,
            user_agent: super::user_agent_value(version),
        }
    }

    pub fn build(
        &self,
        parts: &Parts,
        body: Body,
        query_string: &[String],
        headers_to_pass: &[String],
    ) -> Request {
        let mut headers = select_headers(parts, headers_to_pass);
        let client_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default();
        headers.insert("X-Forwarded-For".into(), vec![client_ip]);
        headers.insert("User-Agent".into(), vec![self.user_agent.clone()]);

        Request {
            method: parts.method.as_str().to_string(),
            path: parts.uri.path().to_string(),
            query: select_query(parts.uri.query().unwrap_or_default(), query_string),
            params: self.params.extract(parts),
            headers,
            body,
        }
    }
}

fn select_headers(parts: &Parts, headers_to_pass: &[String]) -> Values {
    if headers_to_pass.iter().any(|name| name == WILDCARD) {
        return header_values(&parts.headers);
    }

    let mut headers = Values::new();
    for name in headers_to_pass {
        let Ok(header) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let values: Vec<String> = parts
            .headers
            .get_all(&header)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(String::from)
            .collect();
        if !values.is_empty() {
            headers.insert(name.clone(), values);
        }
    }
    headers
}

fn select_query(raw: &str, query_string: &[String]) -> Values {
    let mut all = Values::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        all.entry(key.into_owned()).or_default().push(value.into_owned());
    }

    if query_string.iter().any(|name| name == WILDCARD) {
        return all;
    }

    query_string
        .iter()
        .filter_map(|name| {
            all.get(name)
                .filter(|values| !values.is_empty())
                .map(|values| (name.clone(), values.clone()))
        })
        .collect()
}
