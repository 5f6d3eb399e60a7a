//! Authentication and authorization error types.
//!
//! Every failure the core can produce is a variant of [`AuthError`]. The
//! variants fall into a small number of families (see [`ErrorFamily`]) which
//! the HTTP boundary exposes through a classification header.

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

/// Errors that can occur during authentication and authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------
    /// The supplied email/password combination is not valid.
    #[error("Bad credentials")]
    BadCredentials,

    /// The account exists but has been deactivated.
    #[error("Account disabled")]
    AccountDisabled,

    /// The account is temporarily locked after repeated failed logins.
    #[error("Account locked")]
    AccountLocked {
        /// When the lock expires, if known.
        until: Option<OffsetDateTime>,
    },

    /// The account referenced by a valid credential no longer exists.
    #[error("Account not found")]
    AccountNotFound,

    /// The request carries no usable credential.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    // -------------------------------------------------------------------------
    // Credentials (JWT)
    // -------------------------------------------------------------------------
    /// The credential's `exp` claim is in the past.
    #[error("Token expired")]
    TokenExpired,

    /// The credential cannot be parsed.
    #[error("Malformed token: {message}")]
    MalformedToken {
        /// Description of the parse failure.
        message: String,
    },

    /// The credential parses but has the wrong structure, algorithm or type.
    #[error("Unsupported token: {message}")]
    UnsupportedToken {
        /// Description of what is unsupported.
        message: String,
    },

    /// The credential signature does not verify against the public key.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The refresh credential verifies but is not (or no longer) persisted.
    #[error("Refresh token not found")]
    RefreshTokenNotFound,

    // -------------------------------------------------------------------------
    // Request handling
    // -------------------------------------------------------------------------
    /// One or more request values failed validation.
    #[error("Validation failed: {}", format_validation_errors(errors))]
    Validation {
        /// The individual failures.
        errors: Vec<ValidationError>,
    },

    /// The authenticated principal may not perform the action.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// The entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `Role`.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The change would break a uniqueness or referential-integrity rule.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// A sort or filter parameter names a field the entity does not have.
    #[error("Unknown field '{field}'")]
    UnknownField {
        /// The offending field name.
        field: String,
        /// Known field names close to the offending one.
        suggestions: Vec<String>,
    },

    // -------------------------------------------------------------------------
    // Server side
    // -------------------------------------------------------------------------
    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

/// A single validation failure.
///
/// Field-level failures name the offending field; value-level failures
/// (for example a duplicate idempotency key) leave `field` empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// The offending field, if the failure is attributable to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationError {
    /// Creates a field-level validation failure.
    #[must_use]
    pub fn field(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a value-level validation failure.
    #[must_use]
    pub fn value(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: None,
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AuthError {
    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `MalformedToken` error.
    #[must_use]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::MalformedToken {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedToken` error.
    #[must_use]
    pub fn unsupported_token(message: impl Into<String>) -> Self {
        Self::UnsupportedToken {
            message: message.into(),
        }
    }

    /// Creates a `Validation` error from a list of failures.
    #[must_use]
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self::Validation { errors }
    }

    /// Creates a `Validation` error with a single field-level failure.
    #[must_use]
    pub fn invalid_field(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            errors: vec![ValidationError::field(field, code, message)],
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `UnknownField` error.
    #[must_use]
    pub fn unknown_field(field: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
            suggestions,
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is a credential (JWT) error.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired
                | Self::MalformedToken { .. }
                | Self::UnsupportedToken { .. }
                | Self::InvalidSignature
                | Self::RefreshTokenNotFound
        )
    }

    /// Returns `true` if this is a conflict error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns the error family used for response classification.
    #[must_use]
    pub fn family(&self) -> ErrorFamily {
        match self {
            Self::BadCredentials
            | Self::AccountDisabled
            | Self::AccountLocked { .. }
            | Self::AccountNotFound
            | Self::Unauthorized { .. }
            | Self::TokenExpired
            | Self::MalformedToken { .. }
            | Self::UnsupportedToken { .. }
            | Self::InvalidSignature
            | Self::RefreshTokenNotFound => ErrorFamily::Authentication,
            Self::Validation { .. } => ErrorFamily::Validation,
            Self::Forbidden { .. } => ErrorFamily::Authorization,
            Self::NotFound { .. } => ErrorFamily::NotFound,
            Self::Conflict { .. } => ErrorFamily::Conflict,
            Self::UnknownField { .. } => ErrorFamily::Query,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                ErrorFamily::Server
            }
        }
    }

    /// Returns the stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadCredentials => "auth.bad-credentials",
            Self::AccountDisabled => "auth.account-disabled",
            Self::AccountLocked { .. } => "auth.account-locked",
            Self::AccountNotFound => "auth.account-not-found",
            Self::Unauthorized { .. } => "auth.unauthorized",
            Self::TokenExpired => "jwt.expired",
            Self::MalformedToken { .. } => "jwt.malformed",
            Self::UnsupportedToken { .. } => "jwt.unsupported",
            Self::InvalidSignature => "jwt.signature",
            Self::RefreshTokenNotFound => "jwt.refresh-token-not-found",
            Self::Validation { .. } => "validation.failed",
            Self::Forbidden { .. } => "access.forbidden",
            Self::NotFound { .. } => "entity.not-found",
            Self::Conflict { .. } => "entity.conflict",
            Self::UnknownField { .. } => "query.unknown-field",
            Self::Storage { .. } => "server.storage",
            Self::Configuration { .. } => "server.configuration",
            Self::Internal { .. } => "server.internal",
        }
    }
}

/// Families of errors, exposed to clients through a classification header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorFamily {
    /// Identity verification and credential failures.
    Authentication,
    /// Request validation failures.
    Validation,
    /// Permission check failures.
    Authorization,
    /// Missing entities.
    NotFound,
    /// Uniqueness and referential-integrity failures.
    Conflict,
    /// Unknown sort or filter fields.
    Query,
    /// Storage, configuration and internal failures.
    Server,
}

impl fmt::Display for ErrorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Validation => write!(f, "validation"),
            Self::Authorization => write!(f, "authorization"),
            Self::NotFound => write!(f, "not-found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Query => write!(f, "query"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
