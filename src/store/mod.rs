//! Token and role stores backing the authorization engine.
//!
//! Both stores are read-only from the gateway's point of view. Entries are
//! written by the authorization server and by whatever admin tooling maintains
//! the resource-to-role mapping; the gateway re-reads them on every request.

pub mod client;
pub mod memory;
pub mod redis;

pub use self::client::{RoleStore, StoreError, StoreResult, TokenStore, parse_role_list};
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
