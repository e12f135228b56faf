//! Request audit pipeline.
//!
//! Wraps request and response bodies so that one [`AuditRecord`](crate::models::AuditRecord)
//! describes each exchange, without changing the bytes either side sees.
//! Records go to an [`AuditSink`] once the response body has been fully sent,
//! or with `error` set when the exchange ends any other way.

mod body;
mod claims;
mod exemption;
mod layer;
mod response;
mod sink;

pub use body::{capture_request, is_capturable, render_query};
pub use claims::{ClaimsError, USER_HEADER, UserClaims, decode_claims, encode_user_header};
pub use exemption::AuditExemption;
pub use layer::{AuditLayer, AuditService};
pub use response::{AuditedBody, PendingRecord, ResponseMode, expected_body_len};
pub use sink::{ACCESS_TARGET, AuditSink, MemorySink, TracingSink};
