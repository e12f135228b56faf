//! Request-scoped helpers shared by the gateway layers.
//!
//! - **Caller IP**: forwarding headers, socket fallback, trusted proxy ranges
//! - **Correlation id**: UUIDv4 per audited exchange, echoed in `x-request-id`

pub mod ip;
pub mod request_id;

pub use ip::{CidrRange, TrustedProxyConfig, UNKNOWN_IP, resolve_client_ip};
pub use request_id::{CorrelationId, REQUEST_ID_HEADER, RequestIdExt};
