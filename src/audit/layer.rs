//! Tower layer producing one [`AuditRecord`] per exchange.
//!
//! # Flow
//!
//! ```text
//! request ─► exempt? ──yes──► inner (untouched)
//!              │no
//!              ▼
//!        correlation id, static fields, claims
//!              ▼
//!        form/JSON body? ──yes──► drain + replay   (requestBody = body text)
//!              │no                                 (requestBody = query text)
//!              ▼
//!            inner ─► response head: status, responseTime, mode
//!              ▼
//!        AuditedBody ─► end of stream ─► sink
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response};
use axum::response::IntoResponse;
use chrono::Utc;
use tower::{Layer, Service};
use tracing::{Instrument, info_span, warn};

use super::body::{capture_request, is_capturable, render_query};
use super::claims::{USER_HEADER, decode_claims, forward_claims};
use super::exemption::AuditExemption;
use super::response::{PendingRecord, ResponseMode, expected_body_len};
use super::sink::AuditSink;
use crate::authz::{CLIENT_ID_HEADER, CLIENT_TYPE_HEADER, bearer_token};
use crate::gateway::RouteTarget;
use crate::metrics;
use crate::middleware::{CorrelationId, TrustedProxyConfig, resolve_client_ip};
use crate::models::{AuditRecord, Classification, ClientType};

/// Audit settings shared by every request.
#[derive(Clone)]
struct AuditSettings {
    exemption: AuditExemption,
    sink: Arc<dyn AuditSink>,
    trusted_proxies: TrustedProxyConfig,
    request_body_limit: usize,
    response_body_limit: usize,
}

/// Audit layer.
#[derive(Clone)]
pub struct AuditLayer {
    settings: Arc<AuditSettings>,
}

impl AuditLayer {
    /// Create an audit layer writing to `sink`.
    ///
    /// Defaults: no exemptions, no trusted proxies, 10MB request bodies, 1MB
    /// response captures.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            settings: Arc::new(AuditSettings {
                exemption: AuditExemption::default(),
                sink,
                trusted_proxies: TrustedProxyConfig::default(),
                request_body_limit: 10 * 1024 * 1024,
                response_body_limit: 1024 * 1024,
            }),
        }
    }

    fn settings_mut(&mut self) -> &mut AuditSettings {
        Arc::make_mut(&mut self.settings)
    }

    pub fn with_exemption(mut self, exemption: AuditExemption) -> Self {
        self.settings_mut().exemption = exemption;
        self
    }

    pub fn with_trusted_proxies(mut self, trusted: TrustedProxyConfig) -> Self {
        self.settings_mut().trusted_proxies = trusted;
        self
    }

    /// Largest request body drained for capture.
    pub fn with_request_body_limit(mut self, limit: usize) -> Self {
        self.settings_mut().request_body_limit = limit;
        self
    }

    /// Largest response body kept in the record.
    pub fn with_response_body_limit(mut self, limit: usize) -> Self {
        self.settings_mut().response_body_limit = limit;
        self
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditService {
            inner,
            settings: Arc::clone(&self.settings),
        }
    }
}

/// Audit service wrapper.
#[derive(Clone)]
pub struct AuditService<S> {
    inner: S,
    settings: Arc<AuditSettings>,
}

impl<S> Service<Request<Body>> for AuditService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let settings = Arc::clone(&self.settings);
        let mut inner = self.inner.clone();

        if settings.exemption.is_exempt(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let correlation_id = CorrelationId::generate();
        req.extensions_mut().insert(correlation_id);

        let classification = req
            .extensions()
            .get::<Classification>()
            .cloned()
            .or_else(|| classification_from_headers(req.headers()));

        let mut record = AuditRecord::begin(
            correlation_id.to_string(),
            req.method().as_str(),
            req.uri().path(),
            request_schema(&req),
            resolve_client_ip(&req, &settings.trusted_proxies),
        )
        .with_target(req.extensions().get::<RouteTarget>().map(|t| t.id().to_string()))
        .with_classification(classification.as_ref());

        attribute_user(&mut req, &mut record, classification.as_ref());

        let span = info_span!("audit", request_id = %correlation_id);

        Box::pin(
            async move {
                let mut pending = PendingRecord::new(record, Arc::clone(&settings.sink));
                let method = req.method().clone();

                let req = if is_capturable(req.headers()) {
                    match capture_request(req, settings.request_body_limit).await {
                        Ok((rebuilt, bytes)) => {
                            pending.record_mut().request_body =
                                Some(String::from_utf8_lossy(&bytes).into_owned());
                            rebuilt
                        }
                        Err(e) => {
                            pending.fail(e.to_string());
                            let mut response = e.into_response();
                            correlation_id.stamp(response.headers_mut());
                            return Ok(response);
                        }
                    }
                } else {
                    pending.record_mut().request_body = Some(render_query(req.uri().query()));
                    req
                };

                let response = match inner.call(req).await {
                    Ok(response) => response,
                    Err(e) => {
                        pending.fail("downstream service failed");
                        return Err(e);
                    }
                };

                let (mut parts, body) = response.into_parts();
                pending
                    .record_mut()
                    .mark_response(parts.status.as_u16(), Utc::now());

                let mode = ResponseMode::for_response(
                    parts.status,
                    &parts.headers,
                    settings.response_body_limit,
                );
                let expected = expected_body_len(&method, parts.status, &parts.headers);
                correlation_id.stamp(&mut parts.headers);

                let body = pending.into_body(body, mode).expecting(expected);
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            .instrument(span),
        )
    }
}

/// `client_id` / `client_type` request headers, for hosts that classify
/// callers without the authorization layer.
fn classification_from_headers(headers: &HeaderMap) -> Option<Classification> {
    let client_id = headers.get(CLIENT_ID_HEADER)?.to_str().ok()?;
    let client_type = ClientType::parse(headers.get(CLIENT_TYPE_HEADER)?.to_str().ok()?)?;
    Some(Classification::new(client_id, client_type))
}

/// URI scheme, then `X-Forwarded-Proto`, then `http`.
fn request_schema<B>(req: &Request<B>) -> String {
    if let Some(scheme) = req.uri().scheme_str() {
        return scheme.to_string();
    }

    req.headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http")
        .to_ascii_lowercase()
}

/// Decode the bearer payload into the record and forward it upstream.
fn attribute_user(
    req: &mut Request<Body>,
    record: &mut AuditRecord,
    classification: Option<&Classification>,
) {
    // Attribution headers upstream only ever come from the decoded token
    req.headers_mut().remove(USER_HEADER);
    req.headers_mut().remove(CLIENT_ID_HEADER);

    let Some(decoded) = bearer_token(req.headers()).map(decode_claims) else {
        return;
    };

    match decoded {
        Ok(claims) => {
            record.set_user(claims.user_id, claims.username.clone());
            forward_claims(
                req.headers_mut(),
                &claims,
                classification.map(|c| c.client_id.as_str()),
            );
        }
        Err(e) => {
            metrics::record_claims_decode_failure();
            warn!(error = %e, path = %req.uri().path(), "Could not decode bearer token claims");
        }
    }
}
