//! Middleware layer.
//!
//! - [`cors_layer`] — origin allow-list as a `tower_http` CORS layer around
//!   the router service
//! - `trace` — per-request span with method, path, status, latency, applied
//!   by the [`Router`](crate::Router) around every handler

mod cors;
pub(crate) mod trace;

pub use cors::cors_layer;
