//! Read-only store interfaces used by the authorization engine.
use async_trait::async_trait;
use thiserror::Error;

use crate::models::AuthenticationRecord;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-layer errors (transport/command/decoding).
///
/// Kept independent from `AppError` so the caller decides how a failure is
/// surfaced. The authorization engine never turns these into a deny.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    BackendConnection(String),
    #[error("store command error: {0}")]
    BackendCommand(String),
    #[error("store value error: {0}")]
    InvalidValue(String),
}

/// Resolves opaque bearer tokens to the authentication they stand for.
///
/// Implementations must tolerate concurrent reads without coordination.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Returns `Ok(None)` when the token is unknown or expired.
    async fn read_authentication(&self, token: &str)
    -> StoreResult<Option<AuthenticationRecord>>;

    /// Check the backend is reachable. In-process stores always are.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Exact-path lookup of the roles required to reach a resource.
#[async_trait]
pub trait RoleStore: Send + Sync + 'static {
    /// Role names (without authority prefix) for `path`, `Ok(None)` if the
    /// path has no mapping.
    async fn required_roles(&self, path: &str) -> StoreResult<Option<Vec<String>>>;
}

/// Parse a stored role list.
///
/// Accepts a JSON array of strings or a comma separated list; blank entries
/// are dropped.
pub fn parse_role_list(raw: &str) -> StoreResult<Vec<String>> {
    let trimmed = raw.trim();

    if trimmed.starts_with('[') {
        let roles: Vec<String> = serde_json::from_str(trimmed)
            .map_err(|e| StoreError::InvalidValue(format!("role list: {e}")))?;
        return Ok(roles
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect());
    }

    Ok(trimmed
        .split(',')
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_list_json_array() {
        assert_eq!(
            parse_role_list(r#"["ADMIN", "USER"]"#).unwrap(),
            vec!["ADMIN", "USER"]
        );
    }

    #[test]
    fn test_parse_role_list_comma_separated() {
        assert_eq!(
            parse_role_list("ADMIN, USER,,").unwrap(),
            vec!["ADMIN", "USER"]
        );
    }

    #[test]
    fn test_parse_role_list_empty() {
        assert!(parse_role_list("").unwrap().is_empty());
        assert!(parse_role_list("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_role_list_malformed_json() {
        assert!(matches!(
            parse_role_list("[\"ADMIN\""),
            Err(StoreError::InvalidValue(_))
        ));
    }
}
