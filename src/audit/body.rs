//! Request body capture.
//!
//! Form and JSON bodies are drained once, recorded, and replayed to the
//! upstream byte for byte. Every other body streams through untouched and the
//! query string stands in for it in the audit record.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, Request, header};

use crate::error::{AppError, AppResult};

const CAPTURED_MEDIA_TYPES: [&str; 2] = ["application/x-www-form-urlencoded", "application/json"];

/// Media type of `Content-Type` without parameters, lowercased.
fn media_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next().unwrap_or_default().trim();
    (!essence.is_empty()).then(|| essence.to_ascii_lowercase())
}

/// Whether the request body should be drained and recorded.
pub fn is_capturable(headers: &HeaderMap) -> bool {
    media_type(headers).is_some_and(|mt| CAPTURED_MEDIA_TYPES.contains(&mt.as_str()))
}

/// Render query parameters as `key=v1,v2&other=v`.
///
/// Values are percent-decoded; keys keep the order they first appear in.
pub fn render_query(query: Option<&str>) -> String {
    let Some(query) = query else {
        return String::new();
    };

    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value.into_owned()),
            None => grouped.push((key.into_owned(), vec![value.into_owned()])),
        }
    }

    grouped
        .into_iter()
        .map(|(key, values)| format!("{key}={}", values.join(",")))
        .collect::<Vec<_>>()
        .join("&")
}

/// Drain the body of `req` and return a rebuilt request replaying it.
///
/// `Content-Length` is set to the drained size; an empty body is announced as
/// chunked instead.
///
/// # Errors
///
/// `AppError::BodyRead` when the body fails or exceeds `limit` bytes.
pub async fn capture_request(
    req: Request<Body>,
    limit: usize,
) -> AppResult<(Request<Body>, Bytes)> {
    let (mut parts, body) = req.into_parts();

    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| AppError::BodyRead(e.to_string()))?;

    if bytes.is_empty() {
        parts.headers.remove(header::CONTENT_LENGTH);
        parts
            .headers
            .insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    } else {
        parts.headers.remove(header::TRANSFER_ENCODING);
        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    }

    Ok((Request::from_parts(parts, Body::from(bytes.clone())), bytes))
}
