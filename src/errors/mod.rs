//! Error handling module for the linkgraph backend.
//!
//! Concept operations fail with a [`ConceptError`]: one of six kinds, each with a fixed HTTP
//! status, plus a positional message template (`"{0} is not the owner of {1}!"`) and the
//! arguments rendered into it. Everything else that can go wrong (storage, hashing, decoding)
//! is an internal failure and reaches the client only as a generic 500.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Message sent for every error that is not part of the taxonomy.
pub const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// Message sent for every request rejected by a route's input schema.
pub const INVALID_INPUT_MESSAGE: &str = "Invalid input";

/// The closed set of user-facing failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing input
    BadValues,
    /// Action requires a logged-in session
    Unauthenticated,
    /// Authenticated but forbidden (wrong credentials, wrong state)
    NotAllowed,
    /// Referenced entity absent
    NotFound,
    /// Actor is not the owning user
    WrongUser,
    /// Referenced sub-resource (e.g. a tag) absent
    DoesNotExist,
}

impl ErrorKind {
    /// Get the HTTP status code for this kind.
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::BadValues => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::NotAllowed => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::WrongUser => StatusCode::CONFLICT,
            ErrorKind::DoesNotExist => StatusCode::GONE,
        }
    }
}

/// A typed concept failure with a re-renderable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptError {
    kind: ErrorKind,
    template: &'static str,
    args: Vec<String>,
    /// Positions in `args` that hold user ids.
    user_args: Vec<usize>,
}

impl ConceptError {
    pub fn new(kind: ErrorKind, template: &'static str) -> Self {
        Self {
            kind,
            template,
            args: Vec::new(),
            user_args: Vec::new(),
        }
    }

    pub fn bad_values(template: &'static str) -> Self {
        Self::new(ErrorKind::BadValues, template)
    }

    pub fn unauthenticated(template: &'static str) -> Self {
        Self::new(ErrorKind::Unauthenticated, template)
    }

    pub fn not_allowed(template: &'static str) -> Self {
        Self::new(ErrorKind::NotAllowed, template)
    }

    pub fn not_found(template: &'static str) -> Self {
        Self::new(ErrorKind::NotFound, template)
    }

    pub fn wrong_user(template: &'static str) -> Self {
        Self::new(ErrorKind::WrongUser, template)
    }

    pub fn does_not_exist(template: &'static str) -> Self {
        Self::new(ErrorKind::DoesNotExist, template)
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Append a positional argument that is a user id.
    ///
    /// The dispatcher swaps these for usernames before the message is rendered.
    pub fn user_arg(mut self, user_id: impl Into<String>) -> Self {
        self.user_args.push(self.args.len());
        self.args.push(user_id.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn user_args(&self) -> &[usize] {
        &self.user_args
    }

    /// Re-render the same failure with new arguments, keeping its kind and template.
    pub fn format_with(&self, args: Vec<String>) -> Self {
        Self {
            kind: self.kind,
            template: self.template,
            args,
            user_args: self.user_args.clone(),
        }
    }

    /// Substitute `{n}` placeholders with the positional arguments.
    ///
    /// Placeholders without a matching argument are left as written.
    pub fn message(&self) -> String {
        render_template(self.template, &self.args)
    }
}

impl fmt::Display for ConceptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ConceptError {}

fn render_template(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            let value = args.get(index)?;
            Some((value, close))
        });
        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A failure from the taxonomy
    #[error("{0}")]
    Concept(ConceptError),
    /// Input rejected by a route schema
    #[error("validation failed: {0}")]
    Validation(String),
    /// Storage error
    #[error("database error: {0}")]
    Database(String),
    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Concept(e) => e.status_code(),
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message a client is allowed to see.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Concept(e) => e.message(),
            AppError::Validation(_) => INVALID_INPUT_MESSAGE.to_string(),
            AppError::Database(_) | AppError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }

    /// The taxonomy kind, if this is a concept failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::Concept(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl From<ConceptError> for AppError {
    fn from(err: ConceptError) -> Self {
        AppError::Concept(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::Internal(format!("JSON error: {}", err))
    }
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub msg: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = ErrorResponse {
            msg: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
