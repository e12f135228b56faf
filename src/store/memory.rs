use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::AuthenticationRecord;
use crate::store::client::{RoleStore, StoreResult, TokenStore};

/// In-process token and role store.
///
/// Used by tests and by embedders that already hold token data in memory.
/// Clones share the same maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tokens: Arc<RwLock<HashMap<String, AuthenticationRecord>>>,
    roles: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_token(&self, token: impl Into<String>, record: AuthenticationRecord) {
        self.tokens.write().await.insert(token.into(), record);
    }

    pub async fn insert_roles<I, S>(&self, path: impl Into<String>, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles
            .write()
            .await
            .insert(path.into(), roles.into_iter().map(Into::into).collect());
    }

    pub async fn remove_roles(&self, path: &str) {
        self.roles.write().await.remove(path);
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn read_authentication(
        &self,
        token: &str,
    ) -> StoreResult<Option<AuthenticationRecord>> {
        Ok(self.tokens.read().await.get(token).cloned())
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn required_roles(&self, path: &str) -> StoreResult<Option<Vec<String>>> {
        Ok(self.roles.read().await.get(path).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_token_is_none() {
        let store = MemoryStore::new();
        assert!(store.read_authentication("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_roles_are_exact_path_lookups() {
        let store = MemoryStore::new();
        store.insert_roles("/api/orders", ["ADMIN"]).await;

        assert_eq!(
            store.required_roles("/api/orders").await.unwrap(),
            Some(vec!["ADMIN".to_string()])
        );
        assert!(store.required_roles("/api/orders/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_role_changes_are_visible_immediately() {
        let store = MemoryStore::new();
        store.insert_roles("/api/orders", ["ADMIN"]).await;
        store.remove_roles("/api/orders").await;

        assert!(store.required_roles("/api/orders").await.unwrap().is_none());
    }
}
