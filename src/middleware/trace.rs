//! Per-request tracing.

use std::future::Future;
use std::time::Instant;

use tracing::{Instrument, info, info_span};

use crate::response::Response;

/// Runs `fut` inside a `request` span and logs one completion line with the
/// status and latency.
pub(crate) async fn traced<F>(method: &http::Method, path: &str, fut: F) -> Response
where
    F: Future<Output = Response>,
{
    let span = info_span!("request", %method, path);
    async move {
        let started = Instant::now();
        let res = fut.await;
        info!(
            status = res.status_code(),
            latency_us = started.elapsed().as_micros() as u64,
            "request completed"
        );
        res
    }
    .instrument(span)
    .await
}
