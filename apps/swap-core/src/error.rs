//! Top-level error type and its HTTP mapping.
//!
//! Composes the lower error types (`PersistenceError`, `AggregatorError`,
//! `DomainError`) plus the boundary-only kinds (validation, auth, IDOR)
//! into one taxonomy, and maps each to an HTTP status code.

use std::collections::HashMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::{AggregatorError, PersistenceError};
use crate::domain::shared::errors::DomainError;

/// A kind from the error taxonomy (spec §7), independent of its HTTP
/// mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request, missing field, invalid address.
    Validation,
    /// Missing/invalid/expired token.
    Unauthenticated,
    /// Cross-user access (IDOR guard tripped).
    Forbidden,
    /// The referenced entity does not exist.
    NotFound,
    /// Upstream aggregator error that exhausted its retry budget before
    /// reaching this boundary, or was reclassified as user-fixable.
    UpstreamFailure,
    /// Database connectivity or constraint failure.
    Persistence,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// The taxonomy name, used as the `code` field of the response body.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Unauthenticated => "AUTH_ERROR",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::UpstreamFailure => "UPSTREAM_ERROR",
            Self::Persistence => "PERSISTENCE_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// The HTTP status this kind maps to.
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::UpstreamFailure => 502,
            Self::Persistence | Self::Internal => 500,
        }
    }
}

/// The crate's single error type, returned by application services and the
/// HTTP handlers alike.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input: bad address, missing field, out-of-range amount.
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable message.
        message: String,
        /// Offending field names, when known.
        fields: Vec<String>,
    },

    /// Missing, invalid, or expired bearer token.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Authenticated caller attempted to act on another user's resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A repository, domain, or application-level lookup came back empty.
    #[error("not found: {0}")]
    NotFound(String),

    /// A domain invariant or business rule was violated.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A persistence adapter failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The aggregator port failed, and the caller's retry budget is
    /// already exhausted (otherwise this is absorbed locally, per spec §7
    /// recovery policy, and never reaches this type).
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    /// Anything uncategorized.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Build a validation error with explicit field names.
    #[must_use]
    pub fn validation(message: impl Into<String>, fields: Vec<String>) -> Self {
        Self::Validation { message: message.into(), fields }
    }

    /// The taxonomy kind this error maps to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) | Self::Persistence(PersistenceError::NotFound(_)) => ErrorKind::NotFound,
            Self::Domain(DomainError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Domain(_) => ErrorKind::Validation,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Aggregator(AggregatorError::Permanent { .. } | AggregatorError::Transient { .. } | AggregatorError::InvalidResponse(_)) => {
                ErrorKind::UpstreamFailure
            }
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Convert to the HTTP-compatible response body.
    #[must_use]
    pub fn to_http_response(&self) -> HttpErrorBody {
        let kind = self.kind();
        let mut details = HashMap::new();
        if let Self::Validation { fields, .. } = self {
            if !fields.is_empty() {
                details.insert("fields".to_string(), fields.join(","));
            }
        }
        HttpErrorBody {
            code: kind.code().to_string(),
            message: self.to_string(),
            status: kind.status(),
            details,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let body = self.to_http_response();
        let status = StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

/// HTTP-compatible error response body, serialized as the JSON error
/// payload for every non-2xx response (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorBody {
    /// Taxonomy code string, e.g. `"VALIDATION_ERROR"`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status code, duplicated into the body for clients that don't
    /// inspect the transport-level status.
    pub status: u16,
    /// Additional details, e.g. offending field names.
    pub details: HashMap<String, String>,
}
