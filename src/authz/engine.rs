//! Token authorization decisions.
//!
//! # Algorithm
//!
//! ```text
//! OPTIONS ───────────────────────────────────────────────► Allow
//! whitelisted path ──────────────────────────────────────► Allow (no classification)
//! no / blank Authorization ──────────────────────────────► Deny(MissingToken)
//! token unknown ─────────────────────────────────────────► Err(Unauthenticated)
//! client-only token ─────────────────────────────────────► Allow, client_type=client
//! end-user token: prefixed required roles ∩ authorities ─► Allow if non-empty
//!                                                          Deny(RoleMismatch) otherwise
//! ```
//!
//! A path without a role mapping has an empty required set and is denied.
//! Store failures are returned as errors and never turned into a deny.

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::{HeaderMap, Method, Request, header};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{Classification, ClientType};
use crate::store::{RoleStore, TokenStore};

const BEARER_PREFIX: &str = "bearer ";

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No usable `Authorization` header
    MissingToken,
    /// Granted authorities do not intersect the path's required roles
    RoleMismatch,
}

/// Outcome of a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Label used for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny(DenyReason::MissingToken) => "missing_token",
            Decision::Deny(DenyReason::RoleMismatch) => "role_mismatch",
        }
    }
}

/// Decision plus the caller classification resolved on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub classification: Option<Classification>,
}

impl Evaluation {
    fn bare(decision: Decision) -> Self {
        Self {
            decision,
            classification: None,
        }
    }
}

/// The parts of a request the engine looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestDescriptor<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestDescriptor<'a> {
    pub fn from_request<B>(req: &'a Request<B>) -> Self {
        Self {
            method: req.method(),
            path: req.uri().path(),
            headers: req.headers(),
        }
    }

    /// Token from the `Authorization` header, `Bearer ` prefix removed.
    ///
    /// `None` when the header is absent, not UTF-8, or blank.
    pub fn bearer_token(&self) -> Option<&'a str> {
        bearer_token(self.headers)
    }
}

/// Extract the bearer token from `Authorization`, accepting a bare token too.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();

    let token = match value.get(..BEARER_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => {
            value.get(BEARER_PREFIX.len()..).unwrap_or_default().trim()
        }
        _ => value,
    };

    (!token.is_empty()).then_some(token)
}

/// Paths that bypass authorization entirely.
///
/// Entries are exact paths, or prefixes written as `/prefix/**` which match
/// `/prefix` itself and everything below it.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl IgnoreList {
    pub fn new(patterns: &[String]) -> Self {
        let mut list = Self::default();
        for pattern in patterns {
            match pattern.strip_suffix("/**") {
                Some(prefix) => list.prefixes.push(prefix.to_string()),
                None => {
                    list.exact.insert(pattern.clone());
                }
            }
        }
        list
    }

    pub fn matches(&self, path: &str) -> bool {
        self.exact.contains(path)
            || self.prefixes.iter().any(|prefix| {
                path.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
    }
}

/// Evaluates requests against the token and role stores.
///
/// Holds only shared handles; one instance serves every request.
#[derive(Clone)]
pub struct AuthorizationEngine {
    tokens: Arc<dyn TokenStore>,
    roles: Arc<dyn RoleStore>,
    authority_prefix: Arc<str>,
    ignore: Arc<IgnoreList>,
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("authority_prefix", &self.authority_prefix)
            .field("ignore", &self.ignore)
            .finish_non_exhaustive()
    }
}

impl AuthorizationEngine {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        roles: Arc<dyn RoleStore>,
        authority_prefix: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            roles,
            authority_prefix: Arc::from(authority_prefix.into()),
            ignore: Arc::new(IgnoreList::default()),
        }
    }

    /// Skip authorization for the given path patterns.
    pub fn with_ignore_urls(mut self, patterns: &[String]) -> Self {
        self.ignore = Arc::new(IgnoreList::new(patterns));
        self
    }

    /// Evaluate one request.
    ///
    /// # Errors
    ///
    /// - `AppError::Unauthenticated` when the token is unknown to the store
    /// - `AppError::Store` when either store fails
    pub async fn check(&self, req: &RequestDescriptor<'_>) -> AppResult<Evaluation> {
        // CORS pre-flight carries no credentials
        if req.method == Method::OPTIONS {
            return Ok(Evaluation::bare(Decision::Allow));
        }

        if self.ignore.matches(req.path) {
            debug!(path = %req.path, "Path is whitelisted, skipping authorization");
            return Ok(Evaluation::bare(Decision::Allow));
        }

        let Some(token) = req.bearer_token() else {
            return Ok(Evaluation::bare(Decision::Deny(DenyReason::MissingToken)));
        };

        let record = self
            .tokens
            .read_authentication(token)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("invalid access token".to_string()))?;

        if record.client_only {
            return Ok(Evaluation {
                decision: Decision::Allow,
                classification: Some(Classification::new(record.client_id, ClientType::Client)),
            });
        }

        let required: HashSet<String> = self
            .roles
            .required_roles(req.path)
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|role| format!("{}{}", self.authority_prefix, role))
            .collect();

        let granted = record
            .effective_authorities()
            .any(|authority| required.contains(authority));

        debug!(
            path = %req.path,
            client_id = %record.client_id,
            required = required.len(),
            granted,
            "Role evaluation finished"
        );

        let decision = if granted {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::RoleMismatch)
        };

        Ok(Evaluation {
            decision,
            classification: Some(Classification::new(record.client_id, ClientType::Password)),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::AuthenticationRecord;
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use axum::body::Body;

    struct FailingStore;

    #[async_trait]
    impl TokenStore for FailingStore {
        async fn read_authentication(
            &self,
            _token: &str,
        ) -> StoreResult<Option<AuthenticationRecord>> {
            Err(StoreError::BackendConnection("connection refused".into()))
        }
    }

    #[async_trait]
    impl RoleStore for FailingStore {
        async fn required_roles(&self, _path: &str) -> StoreResult<Option<Vec<String>>> {
            Err(StoreError::BackendCommand("timeout".into()))
        }
    }

    fn engine(store: &MemoryStore) -> AuthorizationEngine {
        AuthorizationEngine::new(Arc::new(store.clone()), Arc::new(store.clone()), "ROLE_")
    }

    fn request(method: Method, path: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn evaluate(engine: &AuthorizationEngine, req: &Request<Body>) -> AppResult<Evaluation> {
        engine.check(&RequestDescriptor::from_request(req)).await
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "bearer  xyz ".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, "raw-token".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("raw-token"));

        headers.insert(header::AUTHORIZATION, "Bearer   ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "   ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_ignore_list_matching() {
        let list = IgnoreList::new(&["/health".to_string(), "/oauth2/**".to_string()]);

        assert!(list.matches("/health"));
        assert!(!list.matches("/health/"));
        assert!(list.matches("/oauth2"));
        assert!(list.matches("/oauth2/oauth/token"));
        assert!(!list.matches("/oauth2x/token"));
        assert!(!list.matches("/api/orders"));
    }

    #[tokio::test]
    async fn test_options_allowed_without_lookup() {
        let engine = AuthorizationEngine::new(Arc::new(FailingStore), Arc::new(FailingStore), "ROLE_");
        let req = request(Method::OPTIONS, "/api/orders", None);

        let eval = evaluate(&engine, &req).await.unwrap();
        assert_eq!(eval.decision, Decision::Allow);
        assert!(eval.classification.is_none());
    }

    #[tokio::test]
    async fn test_missing_header_denied() {
        let engine = engine(&MemoryStore::new());
        let req = request(Method::GET, "/api/orders", None);

        let eval = evaluate(&engine, &req).await.unwrap();
        assert_eq!(eval.decision, Decision::Deny(DenyReason::MissingToken));
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthenticated() {
        let engine = engine(&MemoryStore::new());
        let req = request(Method::GET, "/api/orders", Some("Bearer nope"));

        let err = evaluate(&engine, &req).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(ref m) if m == "invalid access token"));
    }

    #[tokio::test]
    async fn test_client_token_skips_roles() {
        let store = MemoryStore::new();
        store
            .insert_token("svc", AuthenticationRecord::client("billing"))
            .await;
        let engine = AuthorizationEngine::new(Arc::new(store), Arc::new(FailingStore), "ROLE_");
        let req = request(Method::POST, "/api/anything", Some("Bearer svc"));

        let eval = evaluate(&engine, &req).await.unwrap();
        assert!(eval.decision.is_granted());
        assert_eq!(
            eval.classification,
            Some(Classification::new("billing", ClientType::Client))
        );
    }

    #[tokio::test]
    async fn test_role_intersection() {
        let store = MemoryStore::new();
        store
            .insert_token("t", AuthenticationRecord::user("web", ["ROLE_ADMIN"]))
            .await;
        store.insert_roles("/admin", ["ADMIN"]).await;
        store.insert_roles("/reports", ["AUDITOR", "FINANCE"]).await;
        let engine = engine(&store);

        let allowed = evaluate(&engine, &request(Method::GET, "/admin", Some("Bearer t")))
            .await
            .unwrap();
        assert_eq!(allowed.decision, Decision::Allow);
        assert_eq!(
            allowed.classification,
            Some(Classification::new("web", ClientType::Password))
        );

        let disjoint = evaluate(&engine, &request(Method::GET, "/reports", Some("Bearer t")))
            .await
            .unwrap();
        assert_eq!(disjoint.decision, Decision::Deny(DenyReason::RoleMismatch));

        let unmapped = evaluate(&engine, &request(Method::GET, "/unmapped", Some("Bearer t")))
            .await
            .unwrap();
        assert_eq!(unmapped.decision, Decision::Deny(DenyReason::RoleMismatch));
        assert!(unmapped.classification.is_some());
    }

    #[tokio::test]
    async fn test_unprefixed_authority_does_not_match() {
        let store = MemoryStore::new();
        store
            .insert_token("t", AuthenticationRecord::user("web", ["ADMIN"]))
            .await;
        store.insert_roles("/admin", ["ADMIN"]).await;

        let eval = evaluate(&engine(&store), &request(Method::GET, "/admin", Some("Bearer t")))
            .await
            .unwrap();
        assert!(!eval.decision.is_granted());
    }

    #[tokio::test]
    async fn test_unauthenticated_principal_contributes_nothing() {
        let store = MemoryStore::new();
        let mut record = AuthenticationRecord::user("web", ["ROLE_ADMIN"]);
        record.authenticated = false;
        store.insert_token("t", record).await;
        store.insert_roles("/admin", ["ADMIN"]).await;

        let eval = evaluate(&engine(&store), &request(Method::GET, "/admin", Some("Bearer t")))
            .await
            .unwrap();
        assert_eq!(eval.decision, Decision::Deny(DenyReason::RoleMismatch));
    }

    #[tokio::test]
    async fn test_role_store_failure_is_error_not_deny() {
        let store = MemoryStore::new();
        store
            .insert_token("t", AuthenticationRecord::user("web", ["ROLE_ADMIN"]))
            .await;
        let engine = AuthorizationEngine::new(Arc::new(store), Arc::new(FailingStore), "ROLE_");

        let err = evaluate(&engine, &request(Method::GET, "/admin", Some("Bearer t")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[tokio::test]
    async fn test_whitelisted_path_skips_everything() {
        let engine = AuthorizationEngine::new(Arc::new(FailingStore), Arc::new(FailingStore), "ROLE_")
            .with_ignore_urls(&["/oauth2/**".to_string()]);

        let eval = evaluate(&engine, &request(Method::POST, "/oauth2/oauth/token", None))
            .await
            .unwrap();
        assert_eq!(eval, Evaluation::bare(Decision::Allow));
    }
}
