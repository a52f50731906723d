//! The client-side dispatcher: encodes a call's request stream, drives it
//! through an inner HTTP/2 service, and decodes the response.

pub mod grpc;

pub use self::grpc::Grpc;

use std::task::{Context, Poll};

/// The trait [`Grpc`] drives a call through: an HTTP/2 transport reduced to
/// exactly the shape gRPC needs — `Request<ReqBody> -> Response<ResponseBody>`.
///
/// Blanket-implemented for anything that is already a
/// [`tower_service::Service`] of that shape, so a [`Channel`](crate::transport::Channel)
/// (or any other `tower::Service<http::Request<B>, Response = http::Response<_>>`,
/// e.g. one assembled from `tower` middleware) can be passed to [`Grpc::new`]
/// directly.
pub trait GrpcService<ReqBody> {
    /// The response body type produced by this service — the raw HTTP/2
    /// body [`crate::codec::Streaming`] decodes messages and trailers out of.
    type ResponseBody: http_body::Body + Send + 'static;
    /// Errors this service's `poll_ready`/`call` can produce.
    type Error: Into<crate::BoxError>;
    /// The future returned by `call`.
    type Future: std::future::Future<Output = Result<http::Response<Self::ResponseBody>, Self::Error>>;

    /// See [`tower_service::Service::poll_ready`].
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>>;

    /// See [`tower_service::Service::call`].
    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future;
}

impl<T, ReqBody, ResBody> GrpcService<ReqBody> for T
where
    T: tower_service::Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    T::Error: Into<crate::BoxError>,
    ResBody: http_body::Body + Send + 'static,
{
    type ResponseBody = ResBody;
    type Error = T::Error;
    type Future = T::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        tower_service::Service::poll_ready(self, cx)
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        tower_service::Service::call(self, request)
    }
}
