use async_trait::async_trait;
use tracing::debug;

use crate::models::AuthenticationRecord;
use crate::store::client::{
    RoleStore, StoreError, StoreResult, TokenStore, parse_role_list,
};

/// Redis-backed token and role store.
///
/// Layout:
/// - `GET {token_prefix}{token}` holds the authentication as a JSON document
/// - `HGET {roles_key} {path}` holds the required roles for a path
///
/// Cloning is cheap; every clone shares the same multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    manager: redis::aio::ConnectionManager,
    token_prefix: String,
    roles_key: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("token_prefix", &self.token_prefix)
            .field("roles_key", &self.roles_key)
            .finish()
    }
}

impl RedisStore {
    /// Connect to Redis at a URL like `redis://localhost:6379`.
    pub async fn connect(
        url: &str,
        token_prefix: impl Into<String>,
        roles_key: impl Into<String>,
    ) -> StoreResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::BackendConnection(e.to_string()))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::BackendConnection(e.to_string()))?;

        Ok(Self {
            manager,
            token_prefix: token_prefix.into(),
            roles_key: roles_key.into(),
        })
    }

    fn token_key(&self, token: &str) -> String {
        format!("{}{}", self.token_prefix, token)
    }
}

#[async_trait]
impl TokenStore for RedisStore {
    async fn read_authentication(
        &self,
        token: &str,
    ) -> StoreResult<Option<AuthenticationRecord>> {
        let mut conn = self.manager.clone();

        let raw: Option<String> = redis::cmd("GET")
            .arg(self.token_key(token))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::BackendCommand(e.to_string()))?;

        match raw {
            Some(json) => {
                let record = serde_json::from_str(&json)
                    .map_err(|e| StoreError::InvalidValue(format!("authentication: {e}")))?;
                Ok(Some(record))
            }
            None => {
                debug!("Token not present in store");
                Ok(None)
            }
        }
    }

    /// Round-trip a `PING`.
    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.manager.clone();

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::BackendCommand(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl RoleStore for RedisStore {
    async fn required_roles(&self, path: &str) -> StoreResult<Option<Vec<String>>> {
        let mut conn = self.manager.clone();

        let raw: Option<String> = redis::cmd("HGET")
            .arg(&self.roles_key)
            .arg(path)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::BackendCommand(e.to_string()))?;

        raw.map(|value| parse_role_list(&value)).transpose()
    }
}
