//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::router;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::Admission;

/// HTTP server exposing the admission check.
pub struct HttpServer<A: Admission + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The admission controller shared by every request
    admission: Arc<A>,
    /// Whether `x-caller-id` may name the caller
    trust_caller_header: bool,
}

impl<A: Admission + 'static> HttpServer<A> {
    /// Create a new HTTP server around an admission controller.
    pub fn new(addr: SocketAddr, admission: Arc<A>) -> Self {
        Self {
            addr,
            admission,
            trust_caller_header: false,
        }
    }

    /// Key callers on the `x-caller-id` header instead of the peer IP.
    pub fn with_trusted_caller_header(mut self, trust: bool) -> Self {
        self.trust_caller_header = trust;
        self
    }

    /// The address this server binds to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            TurnstileError::Io(e)
        })?;

        info!(
            addr = %self.addr,
            trust_caller_header = self.trust_caller_header,
            "Starting HTTP server with graceful shutdown"
        );

        let app = router(self.admission, self.trust_caller_header)
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                TurnstileError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LimiterConfig, WindowLimiter};
    use crate::store::MemoryStore;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let limiter = Arc::new(WindowLimiter::new(LimiterConfig::default(), MemoryStore::new()).unwrap());
        let server = HttpServer::new(addr, limiter);
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown_signal() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let limiter = Arc::new(WindowLimiter::new(LimiterConfig::default(), MemoryStore::new()).unwrap());
        let server = HttpServer::new(addr, limiter);

        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
