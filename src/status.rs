//! HTTP status codes as a typed enum.
//!
//! Use [`Status`] anywhere a status code is accepted — `Response::status()`,
//! `Response::builder().status()`, or as a bare handler return value.
//!
//! ```rust
//! use folio::{Response, Status};
//!
//! // status-only, no body
//! Response::status(Status::NoContent);
//!
//! Response::builder()
//!     .status(Status::ServiceUnavailable)
//!     .header("retry-after", "5")
//!     .text("store unavailable");
//! ```

/// The status codes this service answers with.
#[allow(clippy::enum_variant_names)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                            // 200
    NoContent,                     // 204

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,                    // 400
    NotFound,                      // 404
    MethodNotAllowed,              // 405
    ContentTooLarge,               // 413
    UnprocessableContent,          // 422

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError,           // 500
    ServiceUnavailable,            // 503
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                   => 200,
            Status::NoContent            => 204,
            Status::BadRequest           => 400,
            Status::NotFound             => 404,
            Status::MethodNotAllowed     => 405,
            Status::ContentTooLarge      => 413,
            Status::UnprocessableContent => 422,
            Status::InternalServerError  => 500,
            Status::ServiceUnavailable   => 503,
        }
    }
}
