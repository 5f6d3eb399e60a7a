//! Error response handling.
//!
//! This module implements `IntoResponse` for `AuthError`. The body is a JSON
//! object with a stable `code` and a `message`; validation errors add the
//! `errors` list and unknown sort fields add `field` and `suggestions`. The
//! error family is exposed in the `X-Error-Family` header.

use axum::{
    Json,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{AuthError, ValidationError};

/// Header carrying the error family of a failed request.
pub const ERROR_FAMILY_HEADER: HeaderName = HeaderName::from_static("x-error-family");

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Individual validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<&'a [ValidationError]>,
    /// Offending sort or filter field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'a str>,
    /// Known fields close to the offending one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<&'a [String]>,
}

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_code(&self);

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorBody {
            code: self.code(),
            message: public_message(&self, status),
            errors: match &self {
                AuthError::Validation { errors } => Some(errors.as_slice()),
                _ => None,
            },
            field: match &self {
                AuthError::UnknownField { field, .. } => Some(field.as_str()),
                _ => None,
            },
            suggestions: match &self {
                AuthError::UnknownField { suggestions, .. } => Some(suggestions.as_slice()),
                _ => None,
            },
        };

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.family().to_string()) {
            headers.insert(ERROR_FAMILY_HEADER, value);
        }

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(self.code(), &body.message);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, Json(body)).into_response()
    }
}

/// Returns the HTTP status for an error.
#[must_use]
pub fn status_code(error: &AuthError) -> StatusCode {
    match error {
        AuthError::BadCredentials
        | AuthError::Unauthorized { .. }
        | AuthError::TokenExpired
        | AuthError::MalformedToken { .. }
        | AuthError::UnsupportedToken { .. }
        | AuthError::InvalidSignature
        | AuthError::RefreshTokenNotFound => StatusCode::UNAUTHORIZED,
        AuthError::AccountNotFound => StatusCode::GONE,
        AuthError::AccountDisabled => StatusCode::FORBIDDEN,
        AuthError::AccountLocked { .. } => StatusCode::LOCKED,
        AuthError::Validation { .. } | AuthError::UnknownField { .. } => StatusCode::BAD_REQUEST,
        AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
        AuthError::NotFound { .. } => StatusCode::NOT_FOUND,
        AuthError::Conflict { .. } => StatusCode::CONFLICT,
        AuthError::Storage { .. } | AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Server-side details stay in the logs.
fn public_message(error: &AuthError, status: StatusCode) -> String {
    if status.is_server_error() {
        "Internal server error".to_string()
    } else {
        error.to_string()
    }
}

/// Builds the WWW-Authenticate header value for 401 responses.
///
/// Format: `Bearer realm="tessera", error="jwt.expired", error_description="..."`
fn build_www_authenticate_header(error: &str, description: &str) -> String {
    let escaped_desc = description.replace('\"', "\\\"");
    format!(
        "Bearer realm=\"tessera\", error=\"{}\", error_description=\"{}\"",
        error, escaped_desc
    )
}
