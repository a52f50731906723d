use std::future::Future;

use crate::codec::Streaming;
use crate::status::Status;
use crate::{Request, Response};

/// Associates a generated service type with the fully-qualified gRPC
/// service name it's reachable under (`package.Service`, the first path
/// segment of every one of its methods' `/package.Service/Method` paths).
///
/// [`Router::add_service`](crate::transport::server::Router::add_service)
/// uses this to route an inbound request to the right handler without
/// inspecting anything beyond the HTTP/2 `:path` pseudo-header.
pub trait NamedService {
    /// The fully qualified name of this gRPC service.
    const NAME: &'static str;
}

/// The handler shape for a `NonStreaming`/`ClientStreaming` RPC: one
/// request, one response.
///
/// Generated server code implements this directly per method; there is no
/// blanket implementation because nothing here needs to flow back through a
/// general-purpose `tower`/`rama` service abstraction — a handler only ever
/// needs to answer [`Grpc::unary`](super::Grpc::unary)/`client_streaming`.
pub trait UnaryService<R>: Send + Sync + 'static {
    /// The response message type.
    type Response;

    /// Serves one request, producing one response or a terminal
    /// [`Status`].
    fn call(&self, request: Request<R>) -> impl Future<Output = Result<Response<Self::Response>, Status>> + Send;
}

/// The handler shape for a `ServerStreaming` RPC: one request, a stream of
/// responses.
pub trait ServerStreamingService<R>: Send + Sync + 'static {
    /// The response message type.
    type Response;
    /// The stream of response messages the handler produces.
    type ResponseStream: tokio_stream::Stream<Item = Result<Self::Response, Status>> + Send + 'static;

    /// Serves one request, producing a response stream or a terminal
    /// [`Status`].
    fn call(
        &self,
        request: Request<R>,
    ) -> impl Future<Output = Result<Response<Self::ResponseStream>, Status>> + Send;
}

/// The handler shape for a `ClientStreaming` RPC: a stream of requests, one
/// response.
pub trait ClientStreamingService<R>: Send + Sync + 'static {
    /// The response message type.
    type Response;

    /// Serves a request stream, producing one response or a terminal
    /// [`Status`].
    fn call(
        &self,
        request: Request<Streaming<R>>,
    ) -> impl Future<Output = Result<Response<Self::Response>, Status>> + Send;
}

/// The handler shape for a `BiDiStreaming` RPC: a stream of requests, a
/// stream of responses, with both directions running concurrently.
pub trait StreamingService<R>: Send + Sync + 'static {
    /// The response message type.
    type Response;
    /// The stream of response messages the handler produces.
    type ResponseStream: tokio_stream::Stream<Item = Result<Self::Response, Status>> + Send + 'static;

    /// Serves a request stream, producing a response stream or a terminal
    /// [`Status`].
    fn call(
        &self,
        request: Request<Streaming<R>>,
    ) -> impl Future<Output = Result<Response<Self::ResponseStream>, Status>> + Send;
}
