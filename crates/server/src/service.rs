use std::convert::Infallible;
use std::fmt::{self, Debug, Formatter};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Method, Request, Response, StatusCode};
use hyper::service::Service as HyperService;
use rivulet_core::{Emitter, WorkerPool};
use tokio::task::JoinHandle;
use tracing::{Instrument, Level};

use crate::ResBody;
use crate::config::StreamsConfig;
use crate::handlers::{self, Streams};

/// Future returned by [`Service::handle`] and [`HyperHandler::handle`].
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response<ResBody>> + Send + 'static>>;

struct Inner {
    streams: Streams,
    pool: WorkerPool,
}

/// Serves the streaming endpoints.
///
/// Cloning the service clones the handle.
#[derive(Clone)]
pub struct Service {
    inner: Arc<Inner>,
}

impl Debug for Service {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("pool", &self.inner.pool)
            .finish()
    }
}

impl Service {
    /// Create a new `Service` whose asynchronous streams run on `pool`.
    #[must_use]
    pub fn new(config: StreamsConfig, pool: WorkerPool) -> Self {
        Self::with_emitter(config, Emitter::new(), pool)
    }

    /// Create a new `Service` with a custom emitter, for example one with a fake clock.
    ///
    /// `pool` is attached to the emitter.
    #[must_use]
    pub fn with_emitter(config: StreamsConfig, emitter: Emitter, pool: WorkerPool) -> Self {
        let emitter = emitter.with_pool(pool.clone());
        Self {
            inner: Arc::new(Inner {
                streams: Streams::new(config, emitter),
                pool,
            }),
        }
    }

    /// Create a hyper service for one connection.
    #[must_use]
    pub fn hyper_handler(&self, remote_addr: Option<SocketAddr>) -> HyperHandler {
        HyperHandler {
            remote_addr,
            service: self.clone(),
        }
    }

    /// Handle a request that did not come through a connection, mostly useful in tests.
    pub fn handle<B>(&self, req: Request<B>) -> ResponseFuture {
        self.hyper_handler(None).handle(req)
    }

    /// Start shutting down the worker pool in the background.
    pub fn shutdown(&self, timeout: Option<Duration>) -> JoinHandle<bool> {
        let pool = self.inner.pool.clone();
        tokio::spawn(async move { pool.shutdown(timeout).await })
    }

    async fn route(&self, method: &Method, path: &str) -> Response<ResBody> {
        let streams = &self.inner.streams;
        let known = matches!(path, "/stream" | "/stream-v2" | "/stream-v3" | "/file-stream");
        if !known {
            return handlers::status_response(StatusCode::NOT_FOUND);
        }
        if method != Method::GET {
            let mut res = handlers::status_response(StatusCode::METHOD_NOT_ALLOWED);
            res.headers_mut()
                .insert(http::header::ALLOW, http::HeaderValue::from_static("GET"));
            return res;
        }
        let result = match path {
            "/stream" => streams.stream(),
            "/stream-v2" => streams.stream_emitter(),
            "/stream-v3" => streams.stream_sse(),
            _ => streams.file_stream().await,
        };
        result.unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to start stream");
            handlers::error_response(&e)
        })
    }
}

/// Hyper service bound to one connection.
#[derive(Clone, Debug)]
pub struct HyperHandler {
    remote_addr: Option<SocketAddr>,
    service: Service,
}

impl HyperHandler {
    /// Handle [`Request`] and returns [`Response`].
    pub fn handle<B>(&self, req: Request<B>) -> ResponseFuture {
        let remote_addr = self
            .remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let span = tracing::span!(
            Level::INFO,
            "Request",
            remote_addr = %remote_addr,
            version = ?req.version(),
            method = %method,
            path = %path,
        );
        Box::pin(respond(self.service.clone(), method, path).instrument(span))
    }
}

async fn respond(service: Service, method: Method, path: String) -> Response<ResBody> {
    let now = Instant::now();
    let res = service.route(&method, &path).await;
    let duration = now.elapsed();
    tracing::info!(
        status = %res.status(),
        streaming = res.body().is_stream(),
        duration = ?duration,
        "Response"
    );
    res
}

impl<B> HyperService<Request<B>> for HyperHandler {
    type Response = Response<ResBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    #[inline]
    fn call(&self, req: Request<B>) -> Self::Future {
        let response = self.handle(req);
        Box::pin(async move { Ok(response.await) })
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    fn service() -> Service {
        Service::new(
            StreamsConfig::default(),
            WorkerPool::new(rivulet_core::PoolConfig::new()),
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_path() {
        let res = service()
            .handle(Request::get("/nothing").body(()).unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(logs_contain("duration"));
    }

    #[tokio::test]
    async fn test_wrong_method() {
        let res = service()
            .handle(Request::post("/stream").body(()).unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[http::header::ALLOW], "GET");
    }

    #[tokio::test]
    async fn test_stream_after_shutdown_is_unavailable() {
        let service = service();
        assert!(service.shutdown(None).await.unwrap());
        let res = service
            .handle(Request::get("/stream-v2").body(()).unwrap())
            .await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
