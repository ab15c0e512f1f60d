//! Serializable api error types returned by the aspree backend.
//!
//! All errors cross the wire as the single [`ErrorResponse`] envelope
//! (`{"success": false, "error": "..."}`); everything else is converted to /
//! from it. Handlers and services construct [`ApiError`]s, whose [`ErrorKind`]
//! determines the HTTP status code via [`ToHttpStatus`].

use std::fmt;

use axum::response::IntoResponse;
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// A trait to get the HTTP status code for a given error.
pub trait ToHttpStatus {
    fn to_http_status(&self) -> StatusCode;
}

/// The error kinds surfaced by the HTTP API.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(test, feature = "test-utils"),
    derive(proptest_derive::Arbitrary)
)]
pub enum ErrorKind {
    /// Missing required field, bad mime type, file too large or small.
    Validation,
    /// Missing or invalid bearer token.
    Unauthorized,
    /// Authenticated principal does not own the requested resource.
    Forbidden,
    /// Unknown id, number, or token.
    NotFound,
    /// Duplicate sku, invoice already paid, etc.
    Conflict,
    /// Attempted edit of an invoice past its editable stages.
    Immutable,
    /// Rate limit bucket exceeded.
    RateLimited,
    /// Gateway / blob / extractor failure.
    Upstream,
    /// Programming error.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Immutable => "immutable",
            Self::RateLimited => "rate_limited",
            Self::Upstream => "upstream",
            Self::Internal => "internal",
        }
    }
}

impl ToHttpStatus for ErrorKind {
    fn to_http_status(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Immutable => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The typed error produced by services and handlers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub msg: String,
}

impl ApiError {
    fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, msg)
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }
    pub fn immutable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Immutable, msg)
    }
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, msg)
    }
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, msg)
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.msg)
    }
}

impl std::error::Error for ApiError {}

impl ToHttpStatus for ApiError {
    fn to_http_status(&self) -> StatusCode {
        self.kind.to_http_status()
    }
}

/// `ErrorResponse` is the JSON-serialized representation of all [`ApiError`]s.
/// It is the only error struct actually sent across the wire.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl From<ApiError> for ErrorResponse {
    fn from(e: ApiError) -> Self {
        Self {
            success: false,
            error: e.msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.to_http_status();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::warn!("{self}");
        }
        let body = ErrorResponse::from(self);
        build_json_response(status, &body)
    }
}

/// A success response wrapper which merges `"success": true` into the
/// serialized payload object, producing the `{success: true, ...}` envelope.
///
/// NOTE: This must only be used for *success* responses; errors go through
/// [`ApiError`]'s [`IntoResponse`] impl which returns error statuses.
pub struct Success<T>(pub T);

impl Success<serde_json::Map<String, serde_json::Value>> {
    /// An envelope with no payload fields: `{"success": true}`.
    pub fn empty() -> Self {
        Self(serde_json::Map::new())
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> axum::response::Response {
        let mut object = match serde_json::to_value(&self.0) {
            Ok(serde_json::Value::Object(object)) => object,
            Ok(serde_json::Value::Null) => serde_json::Map::new(),
            Ok(other) => {
                // Non-object payloads are nested to keep the envelope flat.
                let mut object = serde_json::Map::new();
                object.insert("data".to_owned(), other);
                object
            }
            Err(e) => {
                return ApiError::internal(format!(
                    "Couldn't serialize response: {e:#}"
                ))
                .into_response();
            }
        };
        object.insert("success".to_owned(), serde_json::Value::Bool(true));
        build_json_response(StatusCode::OK, &object)
    }
}

/// Constructs a JSON response from the data and status code. If serialization
/// fails for some reason (very unlikely), returns a plain 500 envelope.
fn build_json_response(
    status: StatusCode,
    data: &impl Serialize,
) -> axum::response::Response {
    fn inner(
        status: StatusCode,
        try_json_bytes: Result<Vec<u8>, serde_json::Error>,
    ) -> axum::response::Response {
        let (status, json_bytes) = match try_json_bytes {
            Ok(jb) => (status, jb),
            Err(e) => {
                tracing::error!("Couldn't serialize response: {e:#}");
                let err_resp = ErrorResponse {
                    success: false,
                    error: "Internal serialization error".to_owned(),
                };
                let json_bytes = serde_json::to_vec(&err_resp)
                    .expect("Serializing ErrorResponse really shouldn't fail");
                (StatusCode::INTERNAL_SERVER_ERROR, json_bytes)
            }
        };

        let mut response =
            axum::response::Response::new(axum::body::Body::from(json_bytes));
        *response.status_mut() = status;
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        response
    }

    inner(status, serde_json::to_vec(data))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kind_status_mapping() {
        use ErrorKind::*;
        let cases = [
            (Validation, 400),
            (Unauthorized, 401),
            (Forbidden, 403),
            (NotFound, 404),
            (Conflict, 409),
            (Immutable, 400),
            (RateLimited, 429),
            (Upstream, 502),
            (Internal, 500),
        ];
        for (kind, code) in cases {
            assert_eq!(kind.to_http_status().as_u16(), code, "{kind:?}");
        }
    }

    #[test]
    fn error_response_shape() {
        let err = ApiError::forbidden("Access denied");
        let json =
            serde_json::to_value(ErrorResponse::from(err)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "error": "Access denied" })
        );
    }
}
