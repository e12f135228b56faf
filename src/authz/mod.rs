//! Token authorization engine.
//!
//! Decides, per request, whether the bearer token presented may reach the
//! requested path, and classifies the caller for the audit stage.

mod engine;
mod layer;

pub use engine::{
    AuthorizationEngine, Decision, DenyReason, Evaluation, IgnoreList, RequestDescriptor,
    bearer_token,
};
pub use layer::{
    AuthorizationLayer, AuthorizationService, CLIENT_ID_HEADER, CLIENT_TYPE_HEADER,
    write_classification,
};
