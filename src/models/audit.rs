use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ClientType, Classification};

/// Structured audit record for one request/response exchange.
///
/// Created when the request enters the audit stage, filled in as request and
/// response data become available, emitted once, then dropped. Field names
/// follow the gateway access-log format consumed by existing log pipelines.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Backend target selected by the route runtime
    pub target_server: Option<String>,
    pub client_type: Option<ClientType>,
    pub request_path: String,
    pub request_method: String,
    /// Correlation id, also returned to the caller in `x-request-id`
    pub request_id: String,
    pub schema: String,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub request_body: Option<String>,
    /// Only populated for `200` JSON responses
    pub response_data: Option<String>,
    /// `true` when `response_data` was cut at the capture limit
    pub response_truncated: bool,
    pub status: Option<u16>,
    pub ip: String,
    pub request_time: DateTime<Utc>,
    pub response_time: Option<DateTime<Utc>>,
    /// Milliseconds between `request_time` and `response_time`
    pub execute_time: i64,
    pub client_id: Option<String>,
    /// Set when the exchange did not complete normally
    pub error: Option<String>,
}

impl AuditRecord {
    /// Start a record for a request arriving now.
    pub fn begin(
        request_id: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        schema: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            request_method: method.into(),
            request_path: path.into(),
            schema: schema.into(),
            ip: ip.into(),
            request_time: Utc::now(),
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target_server = target;
        self
    }

    pub fn with_classification(mut self, classification: Option<&Classification>) -> Self {
        if let Some(c) = classification {
            self.client_id = Some(c.client_id.clone());
            self.client_type = Some(c.client_type);
        }
        self
    }

    /// Attribute the exchange to an end user.
    pub fn set_user(&mut self, user_id: i64, username: impl Into<String>) {
        self.user_id = Some(user_id);
        self.username = Some(username.into());
    }

    /// Record the response head: status plus the response timestamp.
    ///
    /// `execute_time` is derived here, at first response data, not at emission.
    pub fn mark_response(&mut self, status: u16, at: DateTime<Utc>) {
        self.status = Some(status);
        self.response_time = Some(at);
        self.execute_time = (at - self.request_time).num_milliseconds().max(0);
    }

    /// Mark the exchange failed. Sets the response timestamp if none was
    /// recorded yet so the duration still reflects time spent.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.response_time.is_none() {
            let now = Utc::now();
            self.response_time = Some(now);
            self.execute_time = (now - self.request_time).num_milliseconds().max(0);
        }
        self.error = Some(reason.into());
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}
