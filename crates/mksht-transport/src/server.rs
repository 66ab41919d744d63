//! HTTP server lifecycle.
//!
//! The listener and the drain-waiter race in one [`WorkGroup`]; whichever
//! finishes first decides how the run ends. The signal watcher runs as a
//! detached task so a later signal can still force an exit while the
//! caller tears down.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::shutdown::ShutdownCoordinator;
use crate::workgroup::WorkGroup;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Listener failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("In-flight requests abandoned before draining completed")]
    DrainInterrupted,

    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A bound listener waiting to be run.
pub struct HttpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl HttpServer {
    pub async fn bind(addr: &str) -> Result<Self, ServeError> {
        let bind_error = |source| ServeError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        info!("Makeshiftd listening on http://{local_addr}");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Actual bound address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve `router` until shutdown completes.
    ///
    /// Returns `Ok` once the listener has drained after a signal,
    /// [`ServeError::DrainInterrupted`] if in-flight work was abandoned
    /// first, and [`ServeError::Serve`] if the listener failed before any
    /// shutdown was requested.
    pub async fn run(
        self,
        router: Router,
        coordinator: Arc<ShutdownCoordinator>,
        signals: mpsc::Receiver<()>,
    ) -> Result<(), ServeError> {
        let mut group = WorkGroup::new();

        let accept = coordinator.accept_scope().clone();
        let listener = self.listener;
        group.spawn(move |stop| async move {
            let stop_accepting = accept.clone();
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    stop_accepting.cancelled().await;
                })
                .into_future();
            tokio::select! {
                result = serve => match result {
                    Ok(()) => {
                        info!("All connections drained");
                        Ok(())
                    }
                    Err(e) if accept.is_cancelled() => {
                        debug!("Listener exited during shutdown: {e}");
                        Ok(())
                    }
                    Err(e) => Err(ServeError::Serve(e)),
                },
                _ = stop.cancelled() => Ok(()),
            }
        });

        let in_flight = coordinator.in_flight_scope().clone();
        group.spawn(move |stop| async move {
            tokio::select! {
                _ = in_flight.cancelled() => Err(ServeError::DrainInterrupted),
                _ = stop.cancelled() => Ok(()),
            }
        });

        // Outlives this call; `run` only returns after forcing the exit.
        let watcher = coordinator.clone();
        tokio::spawn(async move { watcher.run(signals).await });

        match group.wait().await {
            Some(result) => result?,
            None => Ok(()),
        }
    }
}
