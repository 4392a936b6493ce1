//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()` — no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], so `main` can close the store and exit.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use hyper::body::{Body, Incoming};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tower::Service;
use tracing::{error, info};

use crate::error::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use folio::Server;
    /// let server = Server::bind(([127, 0, 0, 1], 8000).into());
    /// ```
    pub fn bind(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Starts accepting connections and dispatching them through `svc`,
    /// usually the service built by [`app`](crate::app).
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve<Svc, B>(self, svc: Svc) -> Result<(), Error>
    where
        Svc: Service<http::Request<Incoming>, Response = http::Response<B>, Error = Infallible>
            + Clone
            + Send
            + 'static,
        Svc::Future: Send + 'static,
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<BoxError>,
    {
        self.serve_with_shutdown(svc, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal`
    /// resolves instead of on a process signal.
    pub async fn serve_with_shutdown<Svc, B, F>(self, svc: Svc, signal: F) -> Result<(), Error>
    where
        Svc: Service<http::Request<Incoming>, Response = http::Response<B>, Error = Infallible>
            + Clone
            + Send
            + 'static,
        Svc::Future: Send + 'static,
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<BoxError>,
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "folio listening");

        // Every spawned connection task, so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting even if
                // more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let svc = TowerToHyperService::new(svc.clone());
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("folio stopped");
        Ok(())
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C). On Windows only Ctrl-C
/// is available.
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
