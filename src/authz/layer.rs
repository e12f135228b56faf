//! Tower layer running the [`AuthorizationEngine`] in front of every route.
//!
//! On allow the caller [`Classification`] is inserted into request extensions
//! for later stages. Whatever response results, denials included, carries the
//! `client_id` / `client_type` headers when a classification was resolved.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::HeaderValue;
use axum::http::{HeaderMap, Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::engine::{AuthorizationEngine, Decision, DenyReason, RequestDescriptor};
use crate::error::AppError;
use crate::metrics;
use crate::models::Classification;

/// Response/request header naming the caller's OAuth client.
pub const CLIENT_ID_HEADER: &str = "client_id";

/// Response/request header naming the caller's token flow.
pub const CLIENT_TYPE_HEADER: &str = "client_type";

/// Authorization layer.
#[derive(Clone, Debug)]
pub struct AuthorizationLayer {
    engine: AuthorizationEngine,
}

impl AuthorizationLayer {
    pub fn new(engine: AuthorizationEngine) -> Self {
        Self { engine }
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = AuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationService {
            inner,
            engine: self.engine.clone(),
        }
    }
}

/// Authorization service wrapper.
#[derive(Clone, Debug)]
pub struct AuthorizationService<S> {
    inner: S,
    engine: AuthorizationEngine,
}

impl<S> Service<Request<Body>> for AuthorizationService<S>
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
        let engine = self.engine.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let evaluation = match engine.check(&RequestDescriptor::from_request(&req)).await {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    metrics::record_authz_decision(outcome_for_error(&e));
                    return Ok(e.into_response());
                }
            };

            metrics::record_authz_decision(evaluation.decision.outcome());

            let mut response = match evaluation.decision {
                Decision::Allow => {
                    if let Some(classification) = &evaluation.classification {
                        req.extensions_mut().insert(classification.clone());
                    }
                    inner.call(req).await?
                }
                Decision::Deny(DenyReason::MissingToken) => {
                    debug!(path = %req.uri().path(), "Request without access token");
                    AppError::Unauthenticated("missing access token".to_string()).into_response()
                }
                Decision::Deny(DenyReason::RoleMismatch) => AppError::Forbidden.into_response(),
            };

            if let Some(classification) = &evaluation.classification {
                write_classification(response.headers_mut(), classification);
            }

            Ok(response)
        })
    }
}

fn outcome_for_error(err: &AppError) -> &'static str {
    match err {
        AppError::Unauthenticated(_) => "invalid_token",
        _ => "error",
    }
}

/// Write the classification headers, skipping a client id that is not a valid
/// header value.
pub fn write_classification(headers: &mut HeaderMap, classification: &Classification) {
    match HeaderValue::from_str(&classification.client_id) {
        Ok(value) => {
            headers.insert(CLIENT_ID_HEADER, value);
        }
        Err(_) => {
            warn!(client_id = %classification.client_id, "Client id is not a valid header value");
        }
    }
    headers.insert(
        CLIENT_TYPE_HEADER,
        HeaderValue::from_static(classification.client_type.as_str()),
    );
}
