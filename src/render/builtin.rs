//! Built-in renders.

use axum::body::Body;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response as HttpResponse};
use serde_json::{Map, Value};

use crate::proxy::Response;
use crate::render::xml;

const MIME_JSON: &str = "application/json";
const MIME_PLAIN: &str = "text/plain";
const MIME_XML: &str = "application/xml";

const YAML_CONTENT_TYPE: &str = "application/x-yaml; charset=utf-8";
const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// `Data` as a JSON object, `{}` when there is no response.
pub fn json(_headers: &HeaderMap, response: Option<Response>) -> HttpResponse {
    let data = response.map(|r| r.data).unwrap_or_default();
    Json(Value::Object(data)).into_response()
}

/// `Data["content"]` as plain text when it is a string, otherwise an empty body.
pub fn string(_headers: &HeaderMap, response: Option<Response>) -> HttpResponse {
    let text = response
        .and_then(|mut r| r.data.remove("content"))
        .and_then(|content| match content {
            Value::String(text) => Some(text),
            _ => None,
        })
        .unwrap_or_default();
    text.into_response()
}

/// Backend status, headers and raw body, untouched.
pub fn noop(_headers: &HeaderMap, response: Option<Response>) -> HttpResponse {
    let Some(response) = response else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let mut out = HttpResponse::new(response.io.unwrap_or_else(Body::empty));
    *out.status_mut() = response.metadata.status_code;
    for (name, values) in &response.metadata.headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                out.headers_mut().append(name.clone(), value);
            }
        }
    }
    out
}

/// Pick JSON, YAML (for `text/plain`) or XML from the `Accept` header.
pub fn negotiate(headers: &HeaderMap, response: Option<Response>) -> HttpResponse {
    match negotiate_format(headers, &[MIME_JSON, MIME_PLAIN, MIME_XML]) {
        Some(MIME_XML) => xml_render(response),
        Some(MIME_PLAIN) => yaml_render(response),
        _ => json(headers, response),
    }
}

/// First offered type matched by the `Accept` header, walked in written order.
pub fn negotiate_format<'a>(headers: &HeaderMap, offered: &[&'a str]) -> Option<&'a str> {
    let accept = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|part| part.split(';').next().unwrap_or_default().trim())
        .filter(|part| !part.is_empty());

    for accepted in accept {
        if let Some(found) = offered.iter().find(|offer| media_matches(accepted, offer)) {
            return Some(*found);
        }
    }
    None
}

fn media_matches(accepted: &str, offered: &str) -> bool {
    if accepted == "*/*" {
        return true;
    }
    match accepted.strip_suffix("/*") {
        Some(kind) => offered
            .split('/')
            .next()
            .is_some_and(|offered_kind| offered_kind.eq_ignore_ascii_case(kind)),
        None => accepted.eq_ignore_ascii_case(offered),
    }
}

fn yaml_render(response: Option<Response>) -> HttpResponse {
    let data = Value::Object(response.map(|r| r.data).unwrap_or_else(Map::new));
    match serde_yaml::to_string(&data) {
        Ok(body) => ([(CONTENT_TYPE, YAML_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "YAML encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn xml_render(response: Option<Response>) -> HttpResponse {
    let body = response
        .and_then(|mut r| r.data.remove("content"))
        .map(|content| xml::to_string("content", &content))
        .unwrap_or_default();
    ([(CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
}
