mod api;
mod audit;
mod auth;

pub use api::HealthResponse;
pub use audit::AuditRecord;
pub use auth::{AuthenticationRecord, Classification, ClientType};
