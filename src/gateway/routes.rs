//! Static prefix route table.
//!
//! Configured through `ROUTES`:
//!
//! ```bash
//! ROUTES="orders=/api/orders=http://orders:8081;users=/api/users=http://users:8082"
//! ```
//!
//! The longest matching prefix wins. The selected route is inserted into
//! request extensions as a [`RouteTarget`] before any other stage runs.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use url::Url;

use crate::error::{AppError, AppResult};

/// One `id=/prefix=upstream` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDefinition {
    pub id: String,
    pub prefix: String,
    pub upstream: Url,
}

impl RouteDefinition {
    /// Parse a single entry.
    pub fn parse(entry: &str) -> AppResult<Self> {
        let mut parts = entry.trim().splitn(3, '=');
        let (Some(id), Some(prefix), Some(upstream)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AppError::ConfigError(format!(
                "Invalid route '{entry}': expected id=/prefix=http://host:port"
            )));
        };

        let id = id.trim();
        let prefix = prefix.trim();
        if id.is_empty() {
            return Err(AppError::ConfigError(format!(
                "Invalid route '{entry}': empty id"
            )));
        }
        if !prefix.starts_with('/') {
            return Err(AppError::ConfigError(format!(
                "Invalid route '{id}': prefix must start with '/'"
            )));
        }

        let upstream = Url::parse(upstream.trim())
            .map_err(|e| AppError::ConfigError(format!("Invalid route '{id}' upstream: {e}")))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "Invalid route '{id}': upstream must be http or https"
            )));
        }

        Ok(Self {
            id: id.to_string(),
            // "/api/" and "/api" select the same requests
            prefix: match prefix.trim_end_matches('/') {
                "" => "/".to_string(),
                trimmed => trimmed.to_string(),
            },
            upstream,
        })
    }

    /// Parse a `;` separated list, skipping blank entries.
    pub fn parse_list(raw: &str) -> AppResult<Vec<Self>> {
        raw.split(';')
            .filter(|entry| !entry.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    fn matches(&self, path: &str) -> bool {
        self.prefix == "/"
            || path
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Upstream URL for `path_and_query`, preserving the request path.
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.upstream.as_str().trim_end_matches('/'),
            path_and_query
        )
    }
}

/// Routes ordered for longest-prefix lookup.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteTarget>,
}

impl RouteTable {
    pub fn new(mut routes: Vec<RouteDefinition>) -> Self {
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self {
            routes: routes.into_iter().map(RouteTarget::new).collect(),
        }
    }

    pub fn select(&self, path: &str) -> Option<&RouteTarget> {
        self.routes.iter().find(|target| target.0.matches(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Route chosen for a request. Read by the audit stage and the forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget(Arc<RouteDefinition>);

impl RouteTarget {
    pub fn new(route: RouteDefinition) -> Self {
        Self(Arc::new(route))
    }

    /// Backend id, recorded as `targetServer`.
    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn route(&self) -> &RouteDefinition {
        &self.0
    }
}

/// Inserts the [`RouteTarget`] of the matching route, if any.
#[derive(Clone, Debug)]
pub struct RouteSelectionLayer {
    table: Arc<RouteTable>,
}

impl RouteSelectionLayer {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }
}

impl<S> Layer<S> for RouteSelectionLayer {
    type Service = RouteSelectionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RouteSelectionService {
            inner,
            table: Arc::clone(&self.table),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RouteSelectionService<S> {
    inner: S,
    table: Arc<RouteTable>,
}

impl<S> Service<Request<Body>> for RouteSelectionService<S>
where
    S: Service<Request<Body>, Response = Response<Body>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        if let Some(target) = self.table.select(req.uri().path()) {
            let target = target.clone();
            req.extensions_mut().insert(target);
        }
        self.inner.call(req)
    }
}
