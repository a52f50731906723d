use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use hyper_util::service::TowerToHyperService;
use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_service::Service;

use crate::body::Body;
use crate::status::Status;
use crate::transport::service::GrpcTimeout;
use crate::BoxError;

use super::Router;

/// Configuration for accepting inbound gRPC calls, the listening-side
/// counterpart to [`crate::transport::Endpoint`].
///
/// Build one with [`Server::builder`], register services with
/// [`Server::add_service`] to get a [`Router`], then drive it with
/// [`Router::serve`]/[`Router::serve_with_shutdown`].
#[derive(Clone)]
pub struct Server {
    pub(crate) concurrency_limit_per_connection: Option<usize>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) tcp_nodelay: bool,
    pub(crate) init_stream_window_size: Option<u32>,
    pub(crate) init_connection_window_size: Option<u32>,
    pub(crate) http2_keep_alive_interval: Option<Duration>,
    pub(crate) http2_keep_alive_timeout: Option<Duration>,
    pub(crate) http2_adaptive_window: Option<bool>,
    pub(crate) http2_max_header_list_size: Option<u32>,
    pub(crate) max_concurrent_streams: Option<u32>,
    pub(crate) max_connection_backlog: i32,
}

impl Server {
    /// Starts a default server configuration.
    pub fn builder() -> Self {
        Self {
            concurrency_limit_per_connection: None,
            timeout: None,
            tcp_nodelay: true,
            init_stream_window_size: None,
            init_connection_window_size: None,
            http2_keep_alive_interval: None,
            http2_keep_alive_timeout: None,
            http2_adaptive_window: None,
            http2_max_header_list_size: None,
            max_concurrent_streams: None,
            max_connection_backlog: 1024,
        }
    }

    /// Caps the number of requests in flight on a single connection.
    pub fn concurrency_limit_per_connection(mut self, limit: usize) -> Self {
        self.concurrency_limit_per_connection = Some(limit);
        self
    }

    /// A deadline applied to every call, in addition to whatever
    /// `grpc-timeout` the peer sent — whichever is tighter wins.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disables Nagle's algorithm on accepted sockets (default: enabled,
    /// i.e. `TCP_NODELAY` is set).
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    pub fn initial_stream_window_size(mut self, size: impl Into<Option<u32>>) -> Self {
        self.init_stream_window_size = size.into();
        self
    }

    pub fn initial_connection_window_size(mut self, size: impl Into<Option<u32>>) -> Self {
        self.init_connection_window_size = size.into();
        self
    }

    pub fn http2_keepalive_interval(mut self, interval: impl Into<Option<Duration>>) -> Self {
        self.http2_keep_alive_interval = interval.into();
        self
    }

    pub fn http2_keepalive_timeout(mut self, duration: impl Into<Option<Duration>>) -> Self {
        self.http2_keep_alive_timeout = duration.into();
        self
    }

    pub fn http2_adaptive_window(mut self, enabled: bool) -> Self {
        self.http2_adaptive_window = Some(enabled);
        self
    }

    pub fn http2_max_header_list_size(mut self, size: u32) -> Self {
        self.http2_max_header_list_size = Some(size);
        self
    }

    pub fn max_concurrent_streams(mut self, max: impl Into<Option<u32>>) -> Self {
        self.max_concurrent_streams = max.into();
        self
    }

    /// Registers the first service and produces a [`Router`] that
    /// additional services can be chained onto.
    #[must_use]
    pub fn add_service<S>(self, svc: S) -> Router
    where
        S: super::NamedService
            + Service<http::Request<Body>, Response = http::Response<Body>, Error = std::convert::Infallible>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        Router::new(self).add_service(svc)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server").finish()
    }
}

/// Turns a service error (deadline expiry from [`GrpcTimeout`], an `h2`
/// stream reset, or anything else [`Status::from_error_generic`] knows how
/// to read) into a Trailers-Only response instead of letting it tear down
/// the HTTP/2 stream — a failure this deep in the stack still owes the
/// peer a `grpc-status`.
#[derive(Clone)]
struct CatchError<S> {
    inner: S,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for CatchError<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<Body>>,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    type Response = http::Response<Body>;
    type Error = std::convert::Infallible;
    type Future = std::pin::Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        match self.inner.poll_ready(cx) {
            std::task::Poll::Ready(Ok(())) => std::task::Poll::Ready(Ok(())),
            std::task::Poll::Ready(Err(_)) => std::task::Poll::Ready(Ok(())),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        let fut = self.inner.call(req);
        Box::pin(async move {
            match fut.await {
                Ok(response) => Ok(response),
                Err(err) => Ok(Status::from_error_generic(err).to_http_response()),
            }
        })
    }
}

/// Binds a listening socket via `socket2` (so `SO_REUSEADDR` and the accept
/// backlog are under our control rather than whatever `std`/`tokio`
/// defaults to) and hands it off to `tokio::net::TcpListener`.
fn bind(addr: SocketAddr, backlog: i32) -> Result<TcpListener, BoxError> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(TcpListener::from_std(socket.into())?)
}

pub(super) async fn serve<F>(router: Router, addr: SocketAddr, shutdown: F) -> Result<(), BoxError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = router.server().clone();
    let listener = bind(addr, server.max_connection_backlog)?;

    let svc = ServiceBuilder::new()
        .map_request(|req: http::Request<Incoming>| req.map(Body::new))
        .layer_fn(|s| CatchError { inner: s })
        .option_layer(
            server
                .concurrency_limit_per_connection
                .map(ConcurrencyLimitLayer::new),
        )
        .layer_fn(|s| GrpcTimeout::new(s, server.timeout))
        .service(router);

    let mut http = AutoBuilder::new(TokioExecutor::new());
    http.http2()
        .initial_stream_window_size(server.init_stream_window_size)
        .initial_connection_window_size(server.init_connection_window_size)
        .keep_alive_interval(server.http2_keep_alive_interval)
        .max_concurrent_streams(server.max_concurrent_streams);

    if let Some(val) = server.http2_keep_alive_timeout {
        http.http2().keep_alive_timeout(val);
    }
    if let Some(val) = server.http2_adaptive_window {
        http.http2().adaptive_window(val);
    }
    if let Some(val) = server.http2_max_header_list_size {
        http.http2().max_header_list_size(val);
    }

    tokio::pin!(shutdown);

    loop {
        let accept = listener.accept();
        tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(()),
            accepted = accept => {
                let (stream, _peer) = accepted?;
                if server.tcp_nodelay {
                    stream.set_nodelay(true)?;
                }

                let io = TokioIo::new(stream);
                let svc = svc.clone();
                let http = http.clone();

                tokio::spawn(async move {
                    let hyper_svc = TowerToHyperService::new(svc);
                    if let Err(err) = http.serve_connection(io, hyper_svc).await {
                        tracing::debug!("connection error: {:?}", err);
                    }
                });
            }
        }
    }
}
