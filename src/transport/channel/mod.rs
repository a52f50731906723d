//! A managed, reconnecting client-side connection to one gRPC peer.
//!
//! [`Endpoint`] configures a connection; [`Endpoint::connect`] (or
//! [`Endpoint::connect_lazy`]) produces a [`Channel`] — a cheaply-clonable
//! handle implementing [`crate::client::GrpcService`] that [`crate::client::Grpc`]
//! drives calls through. Reconnection (exponential backoff) happens
//! transparently inside the channel; callers never see a "disconnected"
//! state, only individual calls failing with [`Code::Unavailable`](crate::status::Code::Unavailable)
//! when one is observed.
//!
//! Multi-backend service discovery and client-side load balancing across
//! peers are out of scope here — a `Channel` always speaks to exactly one
//! target URI, reconnecting to that same target on loss.

mod service;

pub(crate) use self::service::{BoxFuture, Connector};
use self::service::{Connection, SharedExec};

use crate::body::Body;
use crate::BoxError;
use http::{HeaderValue, Request as HttpRequest, Uri};
use std::fmt;
use std::time::Duration;
use tower::buffer::Buffer;
use tower::util::BoxService;
use tower_service::Service;

/// A request as it travels through the channel's middleware stack, before
/// it's specialized to gRPC's `Request<Body>` shape used everywhere else in
/// the crate.
pub(crate) type RawRequest<B> = HttpRequest<B>;

/// The default bound on calls buffered while a [`Channel`]'s worker task is
/// busy (mirrors the bound used by `tower::buffer` elsewhere in the
/// ecosystem).
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Configuration for a single-peer client connection.
///
/// Build one with [`Endpoint::new`] or [`Endpoint::from_static`], adjust it
/// with the builder methods, then call [`Endpoint::connect`] or
/// [`Endpoint::connect_lazy`] to produce a [`Channel`].
#[derive(Clone)]
pub struct Endpoint {
    pub(crate) uri: Uri,
    pub(crate) origin: Option<Uri>,
    pub(crate) user_agent: Option<HeaderValue>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) concurrency_limit: Option<usize>,
    pub(crate) rate_limit: Option<(u64, Duration)>,
    pub(crate) executor: SharedExec,
    pub(crate) init_stream_window_size: Option<u32>,
    pub(crate) init_connection_window_size: Option<u32>,
    pub(crate) http2_keep_alive_interval: Option<Duration>,
    pub(crate) http2_keep_alive_timeout: Option<Duration>,
    pub(crate) http2_keep_alive_while_idle: Option<bool>,
    pub(crate) http2_adaptive_window: Option<bool>,
    pub(crate) http2_max_header_list_size: Option<u32>,
    pub(crate) buffer_size: Option<usize>,
}

impl Endpoint {
    /// Parses `uri` and starts a default configuration targeting it.
    pub fn new<D>(uri: D) -> Result<Self, BoxError>
    where
        D: TryInto<Uri>,
        D::Error: Into<BoxError>,
    {
        let uri = uri.try_into().map_err(Into::into)?;
        Ok(Self::from_uri(uri))
    }

    /// Like [`Endpoint::new`], for a `&'static str` known to parse.
    pub fn from_static(s: &'static str) -> Self {
        Self::from_uri(Uri::from_static(s))
    }

    fn from_uri(uri: Uri) -> Self {
        Self {
            uri,
            origin: None,
            user_agent: None,
            timeout: None,
            concurrency_limit: None,
            rate_limit: None,
            executor: SharedExec::tokio(),
            init_stream_window_size: None,
            init_connection_window_size: None,
            http2_keep_alive_interval: None,
            http2_keep_alive_timeout: None,
            http2_keep_alive_while_idle: None,
            http2_adaptive_window: None,
            http2_max_header_list_size: None,
            buffer_size: None,
        }
    }

    pub(crate) fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Presents a different `:authority`/scheme to the peer than the one
    /// dialed — useful when connecting through a proxy.
    pub fn origin(mut self, origin: Uri) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Overrides the `user-agent` header sent with every request (default:
    /// `grpc-core/<version>`).
    pub fn user_agent<T>(mut self, user_agent: T) -> Result<Self, BoxError>
    where
        T: TryInto<HeaderValue>,
        T::Error: Into<BoxError>,
    {
        self.user_agent = Some(user_agent.try_into().map_err(Into::into)?);
        Ok(self)
    }

    /// A deadline applied to every call made through the resulting channel,
    /// in addition to any `grpc-timeout` the caller set on the request
    /// itself — whichever is tighter wins.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Caps the number of requests in flight on the connection at once.
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    /// Caps the request rate to `limit` requests per `duration`.
    pub fn rate_limit(mut self, limit: u64, duration: Duration) -> Self {
        self.rate_limit = Some((limit, duration));
        self
    }

    /// Supplies the executor used to drive the HTTP/2 connection task
    /// (default: spawn onto the ambient Tokio runtime).
    pub fn executor<E>(mut self, executor: E) -> Self
    where
        E: hyper::rt::Executor<BoxFuture<'static, ()>> + Send + Sync + 'static,
    {
        self.executor = SharedExec::new(executor);
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

    pub fn http2_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.http2_keep_alive_interval = Some(interval);
        self
    }

    pub fn keep_alive_timeout(mut self, duration: Duration) -> Self {
        self.http2_keep_alive_timeout = Some(duration);
        self
    }

    pub fn keep_alive_while_idle(mut self, enabled: bool) -> Self {
        self.http2_keep_alive_while_idle = Some(enabled);
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

    /// The number of calls buffered while the channel's worker task is busy
    /// (default: 1024).
    pub fn buffer_size(mut self, size: impl Into<Option<usize>>) -> Self {
        self.buffer_size = size.into();
        self
    }

    /// Connects using the default plaintext connector, awaiting readiness
    /// before returning.
    pub async fn connect(self) -> Result<Channel, BoxError> {
        self.connect_with_connector(Connector::new()).await
    }

    /// Like [`Endpoint::connect`], but returns immediately — the first call
    /// made through the channel pays the connect latency (and any
    /// reconnect backoff) instead.
    pub fn connect_lazy(self) -> Channel {
        self.connect_with_connector_lazy(Connector::new())
    }

    /// Connects using a caller-supplied connector — e.g. one that wraps
    /// the dialed stream in TLS, which this crate does not do itself.
    pub async fn connect_with_connector<C>(self, connector: C) -> Result<Channel, BoxError>
    where
        C: Service<Uri> + Send + 'static,
        C::Error: Into<BoxError> + Send,
        C::Future: Unpin + Send,
        C::Response: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let conn = Connection::connect(connector, self, default_modifier).await?;
        Ok(Channel::new(conn, buffer_size))
    }

    /// Like [`Endpoint::connect_with_connector`], but lazy.
    pub fn connect_with_connector_lazy<C>(self, connector: C) -> Channel
    where
        C: Service<Uri> + Send + 'static,
        C::Error: Into<BoxError> + Send,
        C::Future: Send,
        C::Response: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let conn = Connection::lazy(connector, self);
        Channel::new(conn, buffer_size)
    }
}

fn default_modifier(req: RawRequest<Body>) -> std::future::Ready<RawRequest<Body>> {
    std::future::ready(req)
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint").field("uri", &self.uri).finish()
    }
}

/// A cheaply-clonable handle to a managed connection, produced by
/// [`Endpoint::connect`]/[`Endpoint::connect_lazy`].
///
/// Cloning a `Channel` does not open a new connection — clones share the
/// same underlying [`Connection`] (and its reconnect state) through a
/// `tower::buffer::Buffer` worker task, so concurrent calls from different
/// clones still multiplex over the one HTTP/2 connection.
type BoxedConnection = BoxService<HttpRequest<Body>, http::Response<Body>, BoxError>;

#[derive(Clone)]
pub struct Channel {
    svc: Buffer<BoxedConnection, HttpRequest<Body>>,
}

impl Channel {
    fn new(conn: Connection, buffer_size: usize) -> Self {
        let boxed: BoxedConnection = BoxService::new(conn);
        Self {
            svc: Buffer::new(boxed, buffer_size),
        }
    }
}

impl Service<HttpRequest<Body>> for Channel {
    type Response = http::Response<Body>;
    type Error = BoxError;
    type Future = <Buffer<BoxedConnection, HttpRequest<Body>> as Service<HttpRequest<Body>>>::Future;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        Service::poll_ready(&mut self.svc, cx)
    }

    fn call(&mut self, req: HttpRequest<Body>) -> Self::Future {
        Service::call(&mut self.svc, req)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parses_static_uri() {
        let endpoint = Endpoint::from_static("http://example.com:443");
        assert_eq!(endpoint.uri().host(), Some("example.com"));
    }

    #[test]
    fn endpoint_rejects_invalid_uri() {
        assert!(Endpoint::new("not a uri").is_err());
    }
}
