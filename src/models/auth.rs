use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of resolving a bearer token against the token store.
///
/// Rebuilt for every request; nothing here is ever written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationRecord {
    /// OAuth client the token was issued to
    pub client_id: String,
    /// Whether the principal behind the token is authenticated
    #[serde(default = "default_authenticated")]
    pub authenticated: bool,
    /// Granted authority names (already carry the authority prefix)
    #[serde(default)]
    pub authorities: BTreeSet<String>,
    /// `true` for client-credentials tokens (service to service, no end user)
    #[serde(default)]
    pub client_only: bool,
}

fn default_authenticated() -> bool {
    true
}

impl AuthenticationRecord {
    /// Token issued to an end user with the given authorities.
    pub fn user<I, S>(client_id: impl Into<String>, authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client_id: client_id.into(),
            authenticated: true,
            authorities: authorities.into_iter().map(Into::into).collect(),
            client_only: false,
        }
    }

    /// Client-credentials token.
    pub fn client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authenticated: true,
            authorities: BTreeSet::new(),
            client_only: true,
        }
    }

    /// Authorities of an authenticated principal; empty otherwise.
    pub fn effective_authorities(&self) -> impl Iterator<Item = &str> {
        self.authorities
            .iter()
            .filter(|_| self.authenticated)
            .map(String::as_str)
    }
}

/// How the caller obtained its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Service-to-service call (client credentials)
    Client,
    /// End-user call (password / authorization code flows)
    Password,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Client => "client",
            ClientType::Password => "password",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client" => Some(ClientType::Client),
            "password" => Some(ClientType::Password),
            _ => None,
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller classification produced by the authorization stage.
///
/// Travels through the middleware chain as a request extension and is read by
/// the audit stage of the same exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub client_id: String,
    pub client_type: ClientType,
}

impl Classification {
    pub fn new(client_id: impl Into<String>, client_type: ClientType) -> Self {
        Self {
            client_id: client_id.into(),
            client_type,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_deserializes_with_defaults() {
        let record: AuthenticationRecord =
            serde_json::from_str(r#"{"client_id":"portal"}"#).unwrap();

        assert_eq!(record.client_id, "portal");
        assert!(record.authenticated);
        assert!(record.authorities.is_empty());
        assert!(!record.client_only);
    }

    #[test]
    fn test_authorities_are_deduplicated() {
        let record = AuthenticationRecord::user("portal", ["ROLE_ADMIN", "ROLE_ADMIN"]);
        assert_eq!(record.authorities.len(), 1);
    }

    #[test]
    fn test_unauthenticated_record_has_no_effective_authorities() {
        let mut record = AuthenticationRecord::user("portal", ["ROLE_ADMIN"]);
        record.authenticated = false;
        assert_eq!(record.effective_authorities().count(), 0);
    }

    #[test]
    fn test_client_type_round_trip() {
        assert_eq!(ClientType::parse("client"), Some(ClientType::Client));
        assert_eq!(ClientType::parse("password"), Some(ClientType::Password));
        assert_eq!(ClientType::parse("other"), None);
        assert_eq!(ClientType::Password.to_string(), "password");
    }
}
