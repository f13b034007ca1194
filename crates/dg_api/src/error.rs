//! Typed error model for the depgraph API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed error codes, one per §7 error kind plus the two operational
/// extras (`Conflict` for "scan already in progress", `Internal` for
/// anything unclassified).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Invalid or contradictory request parameters.
    InvalidRequest,
    /// Key not found (RepoStatus, package row, …).
    NotFound,
    /// VCS subprocess or HTTP collaborator failure (transient I/O).
    VcsError,
    /// Corrupt row or schema mismatch.
    Structural,
    /// Write token mismatch (a token was supplied but did not match).
    AuthRequired,
    /// Write token required for this method but none was supplied (§6
    /// "absence when required -> 400", kept distinct from `AuthRequired` so
    /// the two map to the two different numeric codes the spec reserves).
    AuthMissing,
    /// Context deadline exceeded or operation cancelled.
    OperationCanceled,
    /// A mutually-exclusive long-running operation is already in flight.
    Conflict,
    /// Unclassified internal error.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::NotFound => write!(f, "not_found"),
            Self::VcsError => write!(f, "vcs_error"),
            Self::Structural => write!(f, "structural"),
            Self::AuthRequired => write!(f, "auth_required"),
            Self::AuthMissing => write!(f, "auth_missing"),
            Self::OperationCanceled => write!(f, "operation_canceled"),
            Self::Conflict => write!(f, "conflict"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl ErrorCode {
    /// JSON-RPC 2.0 numeric code carried on the wire (§6: "Reserve 404 for
    /// key not found. Standard JSON-RPC codes for invalid-params and system
    /// errors... Mismatch -> error code 401; absence when required -> 400").
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::NotFound => 404,
            Self::AuthRequired => 401,
            Self::AuthMissing => 400,
            Self::InvalidRequest => -32602, // JSON-RPC "Invalid params"
            Self::Internal | Self::Structural | Self::VcsError => -32603, // "Internal error"
            Self::Conflict => 409,
            Self::OperationCanceled => 499,
        }
    }
}

/// Structured error response carried in both RPC responses and Engine
/// return values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    /// Error code
    pub code: ErrorCode,
    /// The JSON-RPC numeric code §6 reserves for `code`, carried on the wire
    /// alongside the symbolic name so clients that only understand the
    /// numeric reservations (404, 401, 400, …) don't need a lookup table.
    pub rpc_code: i64,
    /// Human-readable message
    pub message: String,
    /// Optional additional context
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            rpc_code: code.rpc_code(),
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add additional details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Shorthand for a `NotFound` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Shorthand for an `InvalidRequest` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}
