//! Server module
use std::future::Future;
use std::io::Result as IoResult;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::{Error, Service};

/// HTTP Server
///
/// A `Server` listens on a TCP port, parses HTTP/1 requests, and hands them off to a
/// [`Service`].
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    builder: http1::Builder,
}

impl Server {
    /// Bind a new `Server` to `addr`.
    pub async fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        Ok(Self::new(listener))
    }

    /// Create a new `Server` on an already bound listener.
    #[must_use]
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            builder: http1::Builder::new(),
        }
    }

    /// Address the server listens on.
    pub fn local_addr(&self) -> IoResult<SocketAddr> {
        self.listener.local_addr()
    }

    /// Use this function to set http1 protocol.
    pub fn http1_mut(&mut self) -> &mut http1::Builder {
        &mut self.builder
    }

    /// Serve with graceful shutdown signal.
    ///
    /// When `signal` resolves the server stops accepting connections, starts shutting
    /// down the worker pool and waits for open connections. With a `timeout`, connections
    /// still open after it elapses are dropped.
    pub async fn serve_with_graceful_shutdown<G>(
        self,
        service: Service,
        signal: G,
        timeout: Option<Duration>,
    ) -> IoResult<()>
    where
        G: Future<Output = ()> + Send + 'static,
    {
        let Self { listener, builder } = self;
        let alive_connections = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let timeout_notify = Arc::new(Notify::new());

        tokio::pin!(signal);

        tracing::info!(addr = ?listener.local_addr().ok(), "listening");

        let builder = Arc::new(builder);
        loop {
            tokio::select! {
                _ = &mut signal => {
                    if let Some(timeout) = timeout {
                        tracing::info!(
                            timeout_in_seconds = timeout.as_secs_f32(),
                            "initiate graceful shutdown",
                        );

                        let timeout_notify = timeout_notify.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(timeout).await;
                            timeout_notify.notify_waiters();
                        });
                    } else {
                        tracing::info!("initiate graceful shutdown");
                    }
                    break;
                },
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote_addr)) => {
                            let handler = service.hyper_handler(Some(remote_addr));
                            let alive_connections = alive_connections.clone();
                            let notify = notify.clone();
                            let timeout_notify = timeout_notify.clone();
                            let builder = builder.clone();
                            alive_connections.fetch_add(1, Ordering::SeqCst);
                            tokio::spawn(async move {
                                let conn = builder.serve_connection(TokioIo::new(stream), handler);
                                if timeout.is_some() {
                                    tokio::select! {
                                        result = conn => {
                                            if let Err(e) = result {
                                                tracing::error!(error = ?e, "http serve connection failed");
                                            }
                                        },
                                        _ = timeout_notify.notified() => {}
                                    }
                                } else if let Err(e) = conn.await {
                                    tracing::error!(error = ?e, "http serve connection failed");
                                }

                                if alive_connections.fetch_sub(1, Ordering::SeqCst) == 1 {
                                    notify.notify_one();
                                }
                            });
                        },
                        Err(e) => {
                            tracing::error!(error = ?e, "accept connection failed");
                        }
                    }
                }
            }
        }
        drop(listener);

        let pool_shutdown = service.shutdown(timeout);

        if alive_connections.load(Ordering::SeqCst) > 0 {
            tracing::info!("wait for all connections to close.");
            notify.notified().await;
        }

        match pool_shutdown.await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("worker pool did not stop in time"),
            Err(e) => tracing::error!(error = ?e, "worker pool shutdown task failed"),
        }

        tracing::info!("server stopped");
        Ok(())
    }
}
