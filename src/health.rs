//! Health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the store be reached? Failure → pulled from load-balancer. |

use tracing::warn;

use crate::{Request, Response, Services, Status};

/// Always returns `200 OK` with body `"ok"`. If the process can respond to
/// HTTP at all, it is alive.
pub async fn liveness(_req: Request, _services: Services) -> Response {
    Response::text("ok")
}

/// Returns `200 OK` with body `"ready"` when a store round-trip succeeds,
/// `503` otherwise.
pub async fn readiness(_req: Request, services: Services) -> Response {
    match services.store().ping().await {
        Ok(()) => Response::text("ready"),
        Err(e) => {
            warn!("readiness check failed: {e}");
            Response::builder()
                .status(Status::ServiceUnavailable)
                .text("store unavailable")
        }
    }
}
