//! Error types with HTTP status and error-kind mapping.
//!
//! [`WsError`] is the central error type of the crate. Each variant maps to
//! an [`ErrorKind`], an HTTP status code, and the structured JSON error
//! response used by WebSocket-only routes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "success": false,
///   "error": {
///     "kind": "USER_INPUT",
///     "message": "This is a WS endpoint"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `false` for error responses.
    pub success: bool,
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with a machine-readable kind and a human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable error message.
    pub message: String,
}

/// Error category reported to HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The client sent something this endpoint does not accept.
    UserInput,
    /// Failure inside the server or a middleware.
    Internal,
    /// Application bootstrap failure.
    Setup,
}

/// Crate-wide error enum.
///
/// # Taxonomy
///
/// | Variant              | Class                       | Kind         |
/// |----------------------|-----------------------------|--------------|
/// | `ConnectionClosed`   | transport write fault       | `INTERNAL`   |
/// | `Encode`             | transport write fault       | `INTERNAL`   |
/// | `DecisionDropped`    | middleware execution fault  | `INTERNAL`   |
/// | `Middleware`         | middleware execution fault  | `INTERNAL`   |
/// | `DecorationConflict` | setup-time fault            | `SETUP`      |
/// | `MissingCapability`  | setup-time fault            | `SETUP`      |
/// | `Config`             | setup-time fault            | `SETUP`      |
/// | `NotWebSocket`       | plain HTTP on a WS route    | `USER_INPUT` |
///
/// An admission rejection is not an error: middlewares report it as
/// `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// The transport side of the connection is gone.
    #[error("connection is closed")]
    ConnectionClosed,

    /// A structured payload could not be encoded to text.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// A callback-style middleware dropped its decision without resolving it.
    #[error("middleware `{0}` dropped its admission decision")]
    DecisionDropped(String),

    /// A middleware failed while deciding admission.
    #[error("middleware failed: {0}")]
    Middleware(String),

    /// A capability with the same name is already installed on the app.
    #[error("capability `{0}` is already installed")]
    DecorationConflict(String),

    /// No capability with this name has been installed on the app.
    #[error("capability `{0}` is not installed")]
    MissingCapability(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A plain HTTP request hit a WebSocket-only route.
    #[error("This is a WS endpoint")]
    NotWebSocket,
}

impl WsError {
    /// Builds a [`WsError::Middleware`] from any displayable cause.
    #[must_use]
    pub fn middleware(cause: impl std::fmt::Display) -> Self {
        Self::Middleware(cause.to_string())
    }

    /// Returns the error category for this variant.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotWebSocket => ErrorKind::UserInput,
            Self::DecorationConflict(_) | Self::MissingCapability(_) | Self::Config(_) => {
                ErrorKind::Setup
            }
            Self::ConnectionClosed
            | Self::Encode(_)
            | Self::DecisionDropped(_)
            | Self::Middleware(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::UserInput => StatusCode::BAD_REQUEST,
            ErrorKind::Internal | ErrorKind::Setup => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the structured response body for this error.
    #[must_use]
    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
            },
        }
    }
}

impl IntoResponse for WsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = axum::Json(self.to_body()).into_response();
        *response.status_mut() = status;
        response
    }
}
