//! Per-exchange correlation id.
//!
//! The audit layer assigns one [`CorrelationId`] to every audited request,
//! stores it in request extensions for downstream handlers, echoes it on the
//! `x-request-id` response header and reuses it as the audit record's
//! `requestId`.
//!
//! ```bash
//! curl -i http://localhost:8080/api/orders
//! # x-request-id: 3f2a0d6c-7b0e-4f3e-9c1a-2a4f1f0b9e11
//! ```

use std::fmt;

use axum::http::header::HeaderValue;
use axum::http::{HeaderMap, Request};
use uuid::Uuid;

/// Response header carrying the correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Random 128-bit identifier for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Header form of the id. A hyphenated UUID is always a valid header value.
    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_str(&self.0.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
    }

    /// Overwrite `x-request-id` in `headers`.
    pub fn stamp(&self, headers: &mut HeaderMap) {
        headers.insert(REQUEST_ID_HEADER, self.header_value());
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Extension trait to read the correlation id assigned to a request.
pub trait RequestIdExt {
    fn correlation_id(&self) -> Option<CorrelationId>;
}

impl<B> RequestIdExt for Request<B> {
    fn correlation_id(&self) -> Option<CorrelationId> {
        self.extensions().get::<CorrelationId>().copied()
    }
}
