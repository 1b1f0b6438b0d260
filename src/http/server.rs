//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::router;
use crate::error::Result;
use crate::ratelimit::RateLimiterBackend;

/// HTTP server for the rate limit service.
pub struct HttpServer<R: RateLimiterBackend + 'static> {
    /// Bound listener
    listener: TcpListener,
    /// The rate limiter instance
    rate_limiter: Arc<R>,
}

impl<R: RateLimiterBackend + 'static> HttpServer<R> {
    /// Bind the server to `addr`.
    pub async fn bind(addr: SocketAddr, rate_limiter: Arc<R>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            rate_limiter,
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = router(self.rate_limiter);

        info!(
            addr = ?self.listener.local_addr().ok(),
            "Starting HTTP server for rate limit service"
        );

        axum::serve(self.listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}
