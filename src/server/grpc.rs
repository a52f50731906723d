use std::{borrow::Cow, fmt, pin::pin};

use http_body::Body as HttpBody;
use tokio_stream::{Stream, StreamExt};

use crate::body::Body;
use crate::codec::{
    Codec, CompressionEncoding, EnabledCompressionEncodings, EncodeBody, Streaming,
};
use crate::metadata::GRPC_CONTENT_TYPE;
use crate::{BoxError, Request, Response, Status};

use super::{ClientStreamingService, ServerStreamingService, StreamingService, UnaryService};

/// A gRPC server handler.
///
/// This wraps a [`Codec`] and drives the four streaming shapes (the
/// [`StreamingType`](crate::codec::StreamingType)) against a caller-supplied
/// handler implementing one of [`UnaryService`]/[`ClientStreamingService`]/
/// [`ServerStreamingService`]/[`StreamingService`] — the mirror image of
/// [`crate::client::Grpc`] on the other side of the call.
///
/// Generated server code (per method, per service) owns picking which of
/// the four `Grpc::*` methods to call; this type owns everything below
/// that: request header validation, message framing, compression, and
/// turning whatever the handler returns (including a [`Status`] error) into
/// a well-formed HTTP/2 response — including the Trailers-Only shortcut
/// when the handler fails before producing a body.
pub struct Grpc<T> {
    codec: T,
    format: Option<Cow<'static, str>>,
    accept_compression_encodings: EnabledCompressionEncodings,
    send_compression_encodings: EnabledCompressionEncodings,
    max_decoding_message_size: Option<usize>,
    max_encoding_message_size: Option<usize>,
}

impl<T> Grpc<T>
where
    T: Codec,
{
    /// Creates a new gRPC server handler around `codec`.
    pub fn new(codec: T) -> Self {
        Self {
            codec,
            format: None,
            accept_compression_encodings: EnabledCompressionEncodings::default(),
            send_compression_encodings: EnabledCompressionEncodings::default(),
            max_decoding_message_size: None,
            max_encoding_message_size: None,
        }
    }

    /// Sets the wire format name this handler expects in `content-type`
    /// (`application/grpc+{format}`), e.g. `proto` or `json`. Left unset,
    /// only plain `application/grpc` and `application/grpc+octet-stream`
    /// are accepted — the shape [`BinaryCodec`](crate::codec::BinaryCodec)
    /// speaks. See [`RpcDescriptor::with_format`](crate::codec::RpcDescriptor::with_format).
    #[must_use]
    pub fn format(mut self, format: impl Into<Cow<'static, str>>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Enable accepting a compressed request encoding. A request compressed
    /// with anything else is rejected with [`Code::Unimplemented`](crate::Code::Unimplemented).
    #[must_use]
    pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
        self.accept_compression_encodings.enable(encoding);
        self
    }

    /// Enable sending a compressed response encoding, when the peer's
    /// `grpc-accept-encoding` allows it.
    #[must_use]
    pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
        self.send_compression_encodings.enable(encoding);
        self
    }

    /// Limits the maximum size of a decoded (request) message.
    #[must_use]
    pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
        self.max_decoding_message_size = Some(limit);
        self
    }

    /// Limits the maximum size of an encoded (response) message.
    #[must_use]
    pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
        self.max_encoding_message_size = Some(limit);
        self
    }

    /// Drives a `NonStreaming`/`ClientStreaming`-with-one-request unary
    /// call: exactly one request message in, exactly one response message
    /// (or a [`Status`]) out.
    pub async fn unary<S, B>(
        &mut self,
        service: S,
        req: http::Request<B>,
    ) -> Result<http::Response<Body>, BoxError>
    where
        S: UnaryService<T::Decode, Response = T::Encode>,
        B: HttpBody<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let accept_encoding = CompressionEncoding::from_accept_encoding_header(
            req.headers(),
            self.send_compression_encodings,
        );

        let request = match self.map_request_unary(req).await {
            Ok(request) => request,
            Err(status) => return Ok(status.to_http_response()),
        };

        let response = service
            .call(request)
            .await
            .map(|response| response.map(|message| tokio_stream::once(Ok(message))));

        self.map_response(response, accept_encoding)
    }

    /// Drives a server-streaming call: one request message in, a stream of
    /// response messages out.
    pub async fn server_streaming<S, B>(
        &mut self,
        service: S,
        req: http::Request<B>,
    ) -> Result<http::Response<Body>, BoxError>
    where
        S: ServerStreamingService<T::Decode, Response = T::Encode>,
        B: HttpBody<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let accept_encoding = CompressionEncoding::from_accept_encoding_header(
            req.headers(),
            self.send_compression_encodings,
        );

        let request = match self.map_request_unary(req).await {
            Ok(request) => request,
            Err(status) => return Ok(status.to_http_response()),
        };

        let response = service.call(request).await;
        self.map_response(response, accept_encoding)
    }

    /// Drives a client-streaming call: a stream of request messages in,
    /// one response message out.
    pub async fn client_streaming<S, B>(
        &mut self,
        service: S,
        req: http::Request<B>,
    ) -> Result<http::Response<Body>, BoxError>
    where
        S: ClientStreamingService<T::Decode, Response = T::Encode>,
        B: HttpBody<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let accept_encoding = CompressionEncoding::from_accept_encoding_header(
            req.headers(),
            self.send_compression_encodings,
        );

        let request = match self.map_request_streaming(req) {
            Ok(request) => request,
            Err(status) => return Ok(status.to_http_response()),
        };

        let response = service
            .call(request)
            .await
            .map(|response| response.map(|message| tokio_stream::once(Ok(message))));

        self.map_response(response, accept_encoding)
    }

    /// Drives a bidirectional streaming call.
    pub async fn streaming<S, B>(
        &mut self,
        service: S,
        req: http::Request<B>,
    ) -> Result<http::Response<Body>, BoxError>
    where
        S: StreamingService<T::Decode, Response = T::Encode>,
        B: HttpBody<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let accept_encoding = CompressionEncoding::from_accept_encoding_header(
            req.headers(),
            self.send_compression_encodings,
        );

        let request = match self.map_request_streaming(req) {
            Ok(request) => request,
            Err(status) => return Ok(status.to_http_response()),
        };

        let response = service.call(request).await;
        self.map_response(response, accept_encoding)
    }

    /// Parses exactly one request message out of `req` (the arity
    /// constraint for `NonStreaming`/`ServerStreaming`: "receiving zero or
    /// >1 is `Internal`" — mirrored here on decode, since a unary handler
    /// can only ever be handed one message).
    async fn map_request_unary<B>(&mut self, req: http::Request<B>) -> Result<Request<T::Decode>, Status>
    where
        B: HttpBody<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        self.check_content_type(&req)?;
        let encoding = self.request_encoding_if_supported(&req)?;

        let (parts, body) = req.into_parts();
        let body = Body::new(body);

        let mut stream = pin!(Streaming::new_request(
            self.codec.decoder(),
            body,
            encoding,
            self.max_decoding_message_size,
        ));

        let message = stream
            .try_next()
            .await?
            .ok_or_else(|| Status::internal("Missing request message."))?;

        let mut request = Request::from_http_parts(parts, message);

        if let Some(trailers) = stream.trailers().await? {
            request.metadata_mut().merge(trailers);
        }

        Ok(request)
    }

    /// Wraps `req` as a streaming request — the compression-rejection path
    /// (peer claimed an encoding we don't accept) surfaces through the
    /// first `poll_next` on the resulting [`Streaming`] rather than being
    /// checked up front, since a streaming handler may never actually pull
    /// a message before erroring out on its own. `content-type` is still
    /// checked up front: an unsupported format means there's no message to
    /// ever decode, so there's nothing gained by deferring it.
    fn map_request_streaming<B>(
        &mut self,
        req: http::Request<B>,
    ) -> Result<Request<Streaming<T::Decode>>, Status>
    where
        B: HttpBody<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        self.check_content_type(&req)?;
        let encoding = self
            .request_encoding_if_supported(&req)
            .unwrap_or(None);
        let max_decoding_message_size = self.max_decoding_message_size;
        let decoder = self.codec.decoder();

        let req = req.map(|body| {
            Streaming::new_request(decoder, Body::new(body), encoding, max_decoding_message_size)
        });

        Ok(Request::from_http(req))
    }

    fn map_response<B>(
        &mut self,
        response: Result<Response<B>, Status>,
        accept_encoding: Option<CompressionEncoding>,
    ) -> Result<http::Response<Body>, BoxError>
    where
        B: Stream<Item = Result<T::Encode, Status>> + Send + 'static,
    {
        let response = match response {
            Ok(response) => response,
            Err(status) => return Ok(status.to_http_response()),
        };

        let (metadata, message, extensions) = response.into_parts();
        let mut http_response = http::Response::new(message);
        *http_response.extensions_mut() = extensions;
        *http_response.headers_mut() = metadata.into_sanitized_headers();

        http_response
            .headers_mut()
            .insert(http::header::CONTENT_TYPE, GRPC_CONTENT_TYPE);

        if let Some(encoding) = accept_encoding {
            http_response.headers_mut().insert(
                crate::codec::compression::ENCODING_HEADER,
                encoding.into_header_value(),
            );
        }

        if let Some(header_value) = self
            .accept_compression_encodings
            .into_accept_encoding_header_value()
        {
            http_response.headers_mut().insert(
                crate::codec::compression::ACCEPT_ENCODING_HEADER,
                header_value,
            );
        }

        let (parts, body) = http_response.into_parts();
        let encoder = self.codec.encoder();
        let max_encoding_message_size = self.max_encoding_message_size;

        let body = EncodeBody::new_server(encoder, body, accept_encoding, max_encoding_message_size);

        Ok(http::Response::from_parts(parts, Body::new(body)))
    }

    fn request_encoding_if_supported<B>(
        &self,
        req: &http::Request<B>,
    ) -> Result<Option<CompressionEncoding>, Status> {
        CompressionEncoding::from_encoding_header(req.headers(), self.accept_compression_encodings)
    }

    /// Accepts only `application/grpc`, `application/grpc+octet-stream`, or
    /// `application/grpc+{format}` for this handler's configured
    /// [`format`](Grpc::format); anything else — a non-gRPC client, a typo,
    /// a mismatched codec — is rejected as `InvalidArgument` before a byte
    /// of the body is touched.
    fn check_content_type<B>(&self, req: &http::Request<B>) -> Result<(), Status> {
        let content_type = req
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());

        let accepted = match content_type {
            Some("application/grpc") | Some("application/grpc+octet-stream") => true,
            Some(content_type) => match &self.format {
                Some(format) => content_type == format!("application/grpc+{format}"),
                None => false,
            },
            None => false,
        };

        if accepted {
            Ok(())
        } else {
            Err(Status::invalid_argument(format!(
                "Content-Type: {} is not supported",
                content_type.unwrap_or("<none>")
            )))
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Grpc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grpc").field("codec", &self.codec).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BinaryCodec;

    fn request_with_content_type(content_type: Option<&str>) -> http::Request<()> {
        let mut builder = http::Request::builder();
        if let Some(content_type) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, content_type);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn plain_grpc_content_type_is_accepted() {
        let grpc = Grpc::new(BinaryCodec::<Vec<u8>>::new());
        assert!(grpc
            .check_content_type(&request_with_content_type(Some("application/grpc")))
            .is_ok());
    }

    #[test]
    fn octet_stream_content_type_is_accepted() {
        let grpc = Grpc::new(BinaryCodec::<Vec<u8>>::new());
        assert!(grpc
            .check_content_type(&request_with_content_type(Some(
                "application/grpc+octet-stream"
            )))
            .is_ok());
    }

    #[test]
    fn matching_named_format_is_accepted() {
        let grpc = Grpc::new(BinaryCodec::<Vec<u8>>::new()).format("proto");
        assert!(grpc
            .check_content_type(&request_with_content_type(Some("application/grpc+proto")))
            .is_ok());
    }

    #[test]
    fn mismatched_named_format_is_rejected() {
        let grpc = Grpc::new(BinaryCodec::<Vec<u8>>::new()).format("proto");
        let status = grpc
            .check_content_type(&request_with_content_type(Some("application/grpc+json")))
            .unwrap_err();
        assert_eq!(status.code(), crate::Code::InvalidArgument);
    }

    #[test]
    fn non_grpc_content_type_is_rejected() {
        let grpc = Grpc::new(BinaryCodec::<Vec<u8>>::new());
        let status = grpc
            .check_content_type(&request_with_content_type(Some("text/plain")))
            .unwrap_err();
        assert_eq!(status.code(), crate::Code::InvalidArgument);
    }

    #[test]
    fn missing_content_type_is_rejected() {
        let grpc = Grpc::new(BinaryCodec::<Vec<u8>>::new());
        assert!(grpc.check_content_type(&request_with_content_type(None)).is_err());
    }
}
