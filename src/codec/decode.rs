use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body::Body as HttpBody;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::Stream;

use super::compression::{self, CompressionEncoding, CompressionSettings};
use super::{DecodeBuf, Decoder};
use crate::body::Body;
use crate::metadata::MetadataMap;
use crate::status::{infer_grpc_status, Code, Status};

const HEADER_SIZE: usize = 5;
const BUFFER_GROWTH_INTERVAL: usize = 8 * 1024;

/// Which side of a call is decoding: requests never carry a `grpc-status`
/// trailer of their own, responses do (or, for an empty unary response,
/// arrive as a trailers-only frame with no DATA at all).
#[derive(Debug, Clone, Copy)]
enum Direction {
    Request,
    Response(StatusCode),
    EmptyResponse,
}

#[derive(Debug)]
enum State {
    ReadHeader,
    ReadBody { compression: bool, len: usize },
    Error,
}

/// An async stream of decoded messages, paired with the metadata trailers
/// the call resolves to once the stream ends.
///
/// This is the state machine behind length-prefixed framing:
/// each `poll_next` call accumulates exactly enough bytes for the next
/// frame header, then the next frame body, decompressing and decoding in
/// between. `flag = 1` with no negotiated compression is a protocol
/// violation and surfaces as [`Code::Internal`].
pub struct Streaming<T> {
    decoder: Box<dyn Decoder<Item = T, Error = Status> + Send>,
    body: Body,
    state: State,
    direction: Direction,
    buf: BytesMut,
    trailers: Option<MetadataMap>,
    decompress_buf: BytesMut,
    encoding: Option<CompressionEncoding>,
    max_message_size: Option<usize>,
}

impl<T> Unpin for Streaming<T> {}

impl<T> Streaming<T> {
    /// Builds a `Streaming` decoding a server's response body.
    pub fn new_response(
        decoder: impl Decoder<Item = T, Error = Status> + Send + 'static,
        body: Body,
        status_code: StatusCode,
        encoding: Option<CompressionEncoding>,
        max_message_size: Option<usize>,
    ) -> Self {
        Self::new(
            decoder,
            body,
            Direction::Response(status_code),
            encoding,
            max_message_size,
        )
    }

    /// Builds a `Streaming` for a response body known in advance to carry no
    /// messages (a trailers-only response).
    pub fn new_empty(
        decoder: impl Decoder<Item = T, Error = Status> + Send + 'static,
        body: Body,
    ) -> Self {
        Self::new(decoder, body, Direction::EmptyResponse, None, None)
    }

    /// Builds a `Streaming` decoding an incoming request body.
    pub fn new_request(
        decoder: impl Decoder<Item = T, Error = Status> + Send + 'static,
        body: Body,
        encoding: Option<CompressionEncoding>,
        max_message_size: Option<usize>,
    ) -> Self {
        Self::new(decoder, body, Direction::Request, encoding, max_message_size)
    }

    fn new(
        decoder: impl Decoder<Item = T, Error = Status> + Send + 'static,
        body: Body,
        direction: Direction,
        encoding: Option<CompressionEncoding>,
        max_message_size: Option<usize>,
    ) -> Self {
        Self {
            decoder: Box::new(decoder),
            body,
            state: State::ReadHeader,
            direction,
            buf: BytesMut::new(),
            trailers: None,
            decompress_buf: BytesMut::new(),
            encoding,
            max_message_size,
        }
    }

    /// The trailers this call resolved to, available once the stream has
    /// fully drained (returned `None` from `poll_next`/`message`).
    pub async fn trailers(&mut self) -> Result<Option<MetadataMap>, Status> {
        if let State::Error = self.state {
            return Ok(self.trailers.take());
        }

        // Drain any remaining messages so the trailers frame is reachable.
        while self.message().await?.is_some() {}
        Ok(self.trailers.take())
    }

    /// Pulls the next decoded message, if any.
    pub async fn message(&mut self) -> Result<Option<T>, Status> {
        use tokio_stream::StreamExt as _;
        match self.next().await {
            Some(Ok(m)) => Ok(Some(m)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn decode_chunk(&mut self) -> Result<Option<T>, Status> {
        if let State::ReadHeader = self.state {
            if self.buf.remaining() < HEADER_SIZE {
                return Ok(None);
            }

            let is_compressed = match self.buf.get_u8() {
                0 => false,
                1 => true,
                flag => {
                    return Err(Status::internal(format!(
                        "unexpected compression flag in gRPC frame: {flag}"
                    )));
                }
            };
            let len = self.buf.get_u32() as usize;

            if is_compressed && self.encoding.is_none() {
                return Err(Status::new(
                    Code::Internal,
                    "protocol error: received compressed frame but no grpc-encoding was negotiated",
                ));
            }

            if let Some(limit) = self.max_message_size {
                // `len` is the on-wire (possibly compressed) length; a
                // compressed message can still grow past `limit` once
                // decompressed, guarded against separately below.
                if !is_compressed && len > limit {
                    return Err(Status::new(
                        Code::ResourceExhausted,
                        format!(
                            "Error, message length too large: found {len} bytes, max allowed: {limit} bytes"
                        ),
                    ));
                }
            }

            self.state = State::ReadBody {
                compression: is_compressed,
                len,
            };
        }

        if let State::ReadBody { compression, len } = self.state {
            if self.buf.remaining() < len {
                self.buf.reserve(len - self.buf.remaining());
                return Ok(None);
            }

            let message = if compression {
                let settings = CompressionSettings {
                    encoding: self.encoding.expect("checked above"),
                    buffer_growth_interval: BUFFER_GROWTH_INTERVAL,
                };
                self.decompress_buf.clear();
                compression::decompress(settings, &mut self.buf, &mut self.decompress_buf, len)
                    .map_err(|e| Status::internal(format!("error decompressing message: {e}")))?;

                if let Some(limit) = self.max_message_size {
                    if self.decompress_buf.len() > limit {
                        return Err(Status::new(
                            Code::ResourceExhausted,
                            format!(
                                "Error, decompressed message length too large: found {} bytes, max allowed: {limit} bytes",
                                self.decompress_buf.len()
                            ),
                        ));
                    }
                }

                let mut buf = DecodeBuf::new(&mut self.decompress_buf);
                self.decoder.decode(&mut buf)?
            } else {
                // Isolate exactly this frame's bytes — `self.buf` may already
                // contain the start of the next frame.
                let mut message_buf = self.buf.split_to(len);
                let mut buf = DecodeBuf::new(&mut message_buf);
                self.decoder.decode(&mut buf)?
            };

            self.state = State::ReadHeader;
            return Ok(message);
        }

        unreachable!("decode_chunk called in State::Error")
    }
}

impl<T> Stream for Streaming<T> {
    type Item = Result<T, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if matches!(this.direction, Direction::EmptyResponse) {
            this.direction = Direction::Response(StatusCode::OK);
            return Poll::Ready(None);
        }

        loop {
            if let State::Error = this.state {
                return Poll::Ready(None);
            }

            match this.decode_chunk() {
                Ok(Some(msg)) => return Poll::Ready(Some(Ok(msg))),
                Ok(None) => {}
                Err(status) => {
                    this.state = State::Error;
                    this.trailers = Some(status.metadata().clone());
                    return Poll::Ready(Some(Err(status)));
                }
            }

            match Pin::new(&mut this.body).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    if frame.is_data() {
                        let data = frame.into_data().unwrap_or_default();
                        this.buf.extend_from_slice(&data);
                        continue;
                    }

                    if let Ok(trailers) = frame.into_trailers() {
                        return Poll::Ready(finish_with_trailers(this, Some(trailers)));
                    }
                    continue;
                }
                Poll::Ready(Some(Err(status))) => {
                    this.state = State::Error;
                    return Poll::Ready(Some(Err(status)));
                }
                Poll::Ready(None) => {
                    return Poll::Ready(finish_with_trailers(this, None));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

fn finish_with_trailers<T>(
    this: &mut Streaming<T>,
    trailers: Option<HeaderMap>,
) -> Option<Result<T, Status>> {
    let status_code = match this.direction {
        Direction::Response(code) => code,
        _ => StatusCode::OK,
    };

    match infer_grpc_status(trailers.as_ref(), status_code) {
        Ok(()) => {
            this.trailers = trailers.map(MetadataMap::from_headers);
            None
        }
        Err(status) => {
            this.trailers = Some(status.metadata().clone());
            this.state = State::Error;
            Some(Err(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BinaryDecoder, BinaryEncoder, BufferSettings, Encoder as _};
    use crate::codec::encode::encode_message;
    use crate::codec::SingleMessageCompressionOverride;

    fn frame(bytes: &[u8]) -> Bytes {
        encode_message(
            &mut BinaryEncoder,
            bytes.to_vec(),
            None,
            BufferSettings::default(),
            SingleMessageCompressionOverride::Inherit,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn decodes_single_message_and_ok_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", "0".parse().unwrap());

        let body_stream = tokio_stream::iter(vec![
            Ok::<_, Status>(http_body::Frame::data(frame(b"hello"))),
            Ok(http_body::Frame::trailers(trailers)),
        ]);
        let body = Body::new(http_body_util::StreamBody::new(body_stream));

        let mut streaming = Streaming::new_response(BinaryDecoder, body, StatusCode::OK, None, None);
        let msg = streaming.message().await.unwrap().unwrap();
        assert_eq!(msg, b"hello");
        assert!(streaming.message().await.unwrap().is_none());
        let trailers = streaming.trailers().await.unwrap();
        assert!(trailers.is_some());
    }

    #[tokio::test]
    async fn compressed_flag_without_negotiation_is_internal_error() {
        let mut raw = BytesMut::new();
        raw.extend_from_slice(&[1, 0, 0, 0, 3, 1, 2, 3]);
        let body_stream =
            tokio_stream::iter(vec![Ok::<_, Status>(http_body::Frame::data(raw.freeze()))]);
        let body = Body::new(http_body_util::StreamBody::new(body_stream));

        let mut streaming = Streaming::new_response(BinaryDecoder, body, StatusCode::OK, None, None);
        let err = streaming.message().await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }
}
