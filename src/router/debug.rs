//! Debug endpoint: logs whatever it receives and answers `pong`.

use axum::body::to_bytes;
use axum::extract::Request;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::proxy::DEFAULT_MAX_BUFFERED_BODY;

pub async fn debug_handler(request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, DEFAULT_MAX_BUFFERED_BODY)
        .await
        .unwrap_or_default();

    tracing::debug!(
        method = %parts.method,
        uri = %parts.uri,
        query = parts.uri.query().unwrap_or_default(),
        headers = ?parts.headers,
        body = %String::from_utf8_lossy(&body),
        "Debug request"
    );

    Json(json!({"message": "pong"})).into_response()
}
