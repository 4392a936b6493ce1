//! Error types.
//!
//! [`Error`] surfaces infrastructure failures: binding to a port, opening
//! the store. [`ApiError`] is the per-request taxonomy; every variant maps to
//! one fixed status code and a `{"detail": ...}` body.

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::response::{IntoResponse, Json, Response};
use crate::status::Status;
use crate::store;

/// The error type returned by folio's fallible startup operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store: {0}")]
    Store(#[from] store::Error),
}

/// A request-scoped failure, rendered as a structured HTTP error.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No entity matches the given key or identifier.
    #[error("{0}")]
    NotFound(String),

    /// A uniqueness violation on create. Answered with `400`.
    #[error("{0}")]
    Conflict(String),

    /// The request is well-formed but its values are rejected.
    #[error("{0}")]
    BadRequest(String),

    /// The body or a path parameter failed validation.
    #[error("request validation failed")]
    InvalidInput(Vec<FieldError>),

    /// The store returned no result from an operation that always returns one.
    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] store::Error),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::Conflict(_) | Self::BadRequest(_) => Status::BadRequest,
            Self::InvalidInput(_) => Status::UnprocessableContent,
            Self::Internal(_) | Self::Store(_) => Status::InternalServerError,
        }
    }
}

/// One validation failure: where it happened, what went wrong, and a short
/// machine-readable kind.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl FieldError {
    pub fn new<const N: usize>(loc: [&str; N], msg: impl Into<String>, kind: &'static str) -> Self {
        Self {
            loc: loc.iter().map(|s| (*s).to_owned()).collect(),
            msg: msg.into(),
            kind,
        }
    }
}

#[derive(Serialize)]
struct Detail<T> {
    detail: T,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let res = match self {
            Self::InvalidInput(errors) => Json(Detail { detail: errors }).into_response(),
            Self::Store(e) => {
                error!("store failure: {e}");
                Json(Detail { detail: "Internal Server Error" }).into_response()
            }
            Self::Internal(detail) => {
                error!("internal failure: {detail}");
                Json(Detail { detail }).into_response()
            }
            other => Json(Detail { detail: other.to_string() }).into_response(),
        };
        (status, res).into_response()
    }
}
