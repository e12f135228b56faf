//! Best-effort user attribution from a bearer JWT.
//!
//! Only the payload segment is decoded; signatures were checked upstream by the
//! authorization server. Failures never abort the exchange.

use axum::http::HeaderMap;
use axum::http::header::HeaderValue;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use thiserror::Error;

/// Request header carrying the form-encoded claims JSON to the upstream.
pub const USER_HEADER: &str = "user";

#[derive(Debug, Error)]
pub enum ClaimsError {
    #[error("token is not a JWS compact serialization")]
    Malformed,
    #[error("payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("payload is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Identity carried in the token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserClaims {
    /// `id` claim, 0 when absent
    pub user_id: i64,
    /// `user_name` claim, empty when absent
    pub username: String,
    /// Payload JSON exactly as decoded
    pub payload: String,
}

/// Decode the payload segment of a compact JWS.
pub fn decode_claims(token: &str) -> Result<UserClaims, ClaimsError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ClaimsError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let json: Value = serde_json::from_slice(&bytes)?;
    let object = json.as_object().ok_or(ClaimsError::NotAnObject)?;

    let user_id = match object.get("id") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    };

    let username = match object.get("user_name") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Ok(UserClaims {
        user_id,
        username,
        payload: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Form-URL-encode the payload for the `user` header.
pub fn encode_user_header(payload: &str) -> String {
    url::form_urlencoded::byte_serialize(payload.as_bytes()).collect()
}

/// Attach `user` and, when known, `client_id` to the forwarded request.
pub fn forward_claims(headers: &mut HeaderMap, claims: &UserClaims, client_id: Option<&str>) {
    // byte_serialize output is pure ASCII
    if let Ok(value) = HeaderValue::from_str(&encode_user_header(&claims.payload)) {
        headers.insert(USER_HEADER, value);
    }

    if let Some(client_id) = client_id
        && let Ok(value) = HeaderValue::from_str(client_id)
    {
        headers.insert(crate::authz::CLIENT_ID_HEADER, value);
    }
}
