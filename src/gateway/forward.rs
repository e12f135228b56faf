//! Streaming forwarder for requests that matched a route.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, header};
use axum::response::Response;
use tracing::{debug, warn};

use super::routes::RouteTarget;
use crate::error::{AppError, AppResult};
use crate::middleware::RequestIdExt;
use crate::state::AppState;

/// Headers scoped to a single connection, never forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Fallback handler: send the request to the selected upstream and stream the
/// response back.
///
/// # Errors
///
/// - `AppError::NotFound` when no route matched
/// - `AppError::BadGateway` when the upstream cannot be reached in time
pub async fn forward(State(state): State<AppState>, req: Request) -> AppResult<Response> {
    let Some(target) = req.extensions().get::<RouteTarget>().cloned() else {
        return Err(AppError::NotFound(req.uri().path().to_string()));
    };

    let path_and_query = req
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str())
        .to_string();
    let url = target.route().upstream_url(&path_and_query);
    let correlation_id = req.correlation_id();

    let (parts, body) = req.into_parts();
    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    // Upstream logs share the id the caller sees
    if let Some(id) = correlation_id {
        id.stamp(&mut headers);
    }

    debug!(target_id = %target.id(), method = %parts.method, url = %url, "Forwarding request");

    let send = state
        .http_client
        .request(parts.method, &url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send();

    let upstream = match tokio::time::timeout(state.config.upstream_timeout, send).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            warn!(target_id = %target.id(), error = %e, "Upstream request failed");
            return Err(AppError::BadGateway(e.to_string()));
        }
        Err(_) => {
            warn!(target_id = %target.id(), "Upstream request timed out");
            return Err(AppError::BadGateway(format!("{} timed out", target.id())));
        }
    };

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;

    Ok(response)
}
