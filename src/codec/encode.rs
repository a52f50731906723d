use bytes::{Bytes, BytesMut};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::Stream;

use super::compression::{self, CompressionEncoding, CompressionSettings, SingleMessageCompressionOverride};
use super::{BufferSettings, EncodeBuf, Encoder};
use crate::status::{Code, Status};

const HEADER_SIZE: usize = 5;

/// Frames a single encoded message: 1-byte compression flag, 4-byte
/// big-endian length, then the (possibly compressed) payload.
pub(crate) fn encode_message<T>(
    encoder: &mut impl Encoder<Item = T, Error = Status>,
    item: T,
    compression: Option<CompressionEncoding>,
    buffer_settings: BufferSettings,
    compression_override: SingleMessageCompressionOverride,
) -> Result<Bytes, Status> {
    let mut buf = BytesMut::with_capacity(buffer_settings.buffer_size);
    buf.resize(HEADER_SIZE, 0);

    {
        let mut encode_buf = EncodeBuf::new(&mut buf);
        encoder.encode(item, &mut encode_buf)?;
    }

    let use_compression =
        compression.filter(|_| compression_override != SingleMessageCompressionOverride::Disable);

    let payload_len = buf.len() - HEADER_SIZE;

    if let Some(encoding) = use_compression {
        let mut uncompressed = buf.split_off(HEADER_SIZE);
        let settings = CompressionSettings {
            encoding,
            buffer_growth_interval: buffer_settings.buffer_size,
        };
        compression::compress(settings, &mut uncompressed, &mut buf, payload_len)
            .map_err(|e| Status::internal(format!("error compressing message: {e}")))?;

        let compressed_len = buf.len() - HEADER_SIZE;
        buf[0] = 1;
        buf[1..5].copy_from_slice(&(compressed_len as u32).to_be_bytes());
    } else {
        buf[0] = 0;
        buf[1..5].copy_from_slice(&(payload_len as u32).to_be_bytes());
    }

    Ok(buf.freeze())
}

/// An `http_body::Body` built from a stream of already-framed message bytes.
///
/// Used on both sides: client request bodies (`trailers = false`, the
/// stream simply ends) and server response bodies (`trailers = true`, the
/// final [`Status`] produced by the stream — or `Status::ok` if it ends
/// without one — becomes the gRPC trailers frame).
#[pin_project]
pub struct EncodeBody<S> {
    #[pin]
    inner: S,
    state: EncodeState,
    emit_trailers: bool,
}

enum EncodeState {
    Streaming,
    Trailers(Option<Status>),
    Done,
}

impl<S> EncodeBody<S>
where
    S: Stream<Item = Result<Bytes, Status>>,
{
    /// Builds a request body: frames ride the stream, no trailing
    /// `grpc-status` is appended.
    pub fn new_request(inner: S) -> Self {
        Self {
            inner,
            state: EncodeState::Streaming,
            emit_trailers: false,
        }
    }

    /// Builds a response body: once `inner` ends (or errors), a
    /// `grpc-status`/`grpc-message` trailers frame is appended.
    pub fn new_response(inner: S) -> Self {
        Self {
            inner,
            state: EncodeState::Streaming,
            emit_trailers: true,
        }
    }
}

/// A type-erased stream of encoded, compressed, length-prefixed frames.
type BoxFrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, Status>> + Send>>;

impl EncodeBody<BoxFrameStream> {
    /// Builds a client request body out of a stream of request messages:
    /// each message is encoded, compressed under `compression` if set, and
    /// checked against `max_message_size` before being framed.
    pub fn new_client<T, C, S>(
        encoder: C,
        messages: S,
        compression: Option<CompressionEncoding>,
        max_message_size: Option<usize>,
    ) -> Self
    where
        C: Encoder<Item = T, Error = Status> + Send + 'static,
        S: Stream<Item = Result<T, Status>> + Send + 'static,
        T: Send + 'static,
    {
        Self::new_request(Box::pin(EncodedMessages::new(
            encoder,
            messages,
            compression,
            max_message_size,
        )))
    }

    /// Builds a server response body out of a stream of response messages,
    /// the same way [`Self::new_client`] does for requests, plus the
    /// trailing `grpc-status` frame.
    pub fn new_server<T, C, S>(
        encoder: C,
        messages: S,
        compression: Option<CompressionEncoding>,
        max_message_size: Option<usize>,
    ) -> Self
    where
        C: Encoder<Item = T, Error = Status> + Send + 'static,
        S: Stream<Item = Result<T, Status>> + Send + 'static,
        T: Send + 'static,
    {
        Self::new_response(Box::pin(EncodedMessages::new(
            encoder,
            messages,
            compression,
            max_message_size,
        )))
    }
}

/// Adapts a stream of messages into a stream of framed, compressed bytes —
/// the piece of [`EncodeBody::new_client`]/[`new_server`](EncodeBody::new_server)
/// that actually calls [`encode_message`] per item.
#[pin_project]
struct EncodedMessages<C, S> {
    encoder: C,
    #[pin]
    inner: S,
    compression: Option<CompressionEncoding>,
    max_message_size: Option<usize>,
}

impl<C, S> EncodedMessages<C, S> {
    fn new(
        encoder: C,
        inner: S,
        compression: Option<CompressionEncoding>,
        max_message_size: Option<usize>,
    ) -> Self {
        Self {
            encoder,
            inner,
            compression,
            max_message_size,
        }
    }
}

impl<T, C, S> Stream for EncodedMessages<C, S>
where
    C: Encoder<Item = T, Error = Status>,
    S: Stream<Item = Result<T, Status>>,
{
    type Item = Result<Bytes, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(item))) => {
                let frame = encode_message(
                    this.encoder,
                    item,
                    *this.compression,
                    BufferSettings::default(),
                    SingleMessageCompressionOverride::Inherit,
                )?;

                if let Some(limit) = *this.max_message_size {
                    // `frame` includes the 5-byte header; compare payload size.
                    if frame.len() - HEADER_SIZE > limit {
                        return Poll::Ready(Some(Err(Status::new(
                            Code::ResourceExhausted,
                            format!(
                                "Error, encoded message length too large: found {} bytes, max allowed: {limit} bytes",
                                frame.len() - HEADER_SIZE
                            ),
                        ))));
                    }
                }

                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(status))) => Poll::Ready(Some(Err(status))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Body for EncodeBody<S>
where
    S: Stream<Item = Result<Bytes, Status>>,
{
    type Data = Bytes;
    type Error = Status;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            match this.state {
                EncodeState::Streaming => match this.inner.as_mut().poll_next(cx) {
                    Poll::Ready(Some(Ok(bytes))) => return Poll::Ready(Some(Ok(Frame::data(bytes)))),
                    Poll::Ready(Some(Err(status))) => {
                        *this.state = EncodeState::Trailers(Some(status));
                    }
                    Poll::Ready(None) => {
                        *this.state = EncodeState::Trailers(None);
                    }
                    Poll::Pending => return Poll::Pending,
                },
                EncodeState::Trailers(status) => {
                    let status = status.take().unwrap_or_else(|| Status::ok(""));
                    *this.state = EncodeState::Done;

                    if !*this.emit_trailers {
                        if status.code() != crate::status::Code::Ok {
                            return Poll::Ready(Some(Err(status)));
                        }
                        return Poll::Ready(None);
                    }

                    let mut trailers = HeaderMap::new();
                    let _ = status.add_header(&mut trailers);
                    return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                }
                EncodeState::Done => return Poll::Ready(None),
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, EncodeState::Done)
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BinaryEncoder, Encoder as _};
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn response_body_appends_ok_trailers() {
        let stream = tokio_stream::iter(vec![Ok(encode_message(
            &mut BinaryEncoder,
            vec![1, 2, 3],
            None,
            BufferSettings::default(),
            SingleMessageCompressionOverride::Inherit,
        )
        .unwrap())]);

        let body = EncodeBody::new_response(stream);
        let collected = body.collect().await.unwrap();
        let trailers = collected.trailers().unwrap();
        assert_eq!(trailers.get("grpc-status").unwrap(), "0");
    }

    #[test]
    fn encode_message_produces_length_prefixed_frame() {
        let mut encoder = BinaryEncoder;
        let framed = encode_message(
            &mut encoder,
            vec![1, 2, 3],
            None,
            BufferSettings::default(),
            SingleMessageCompressionOverride::Inherit,
        )
        .unwrap();

        assert_eq!(framed[0], 0);
        assert_eq!(u32::from_be_bytes(framed[1..5].try_into().unwrap()), 3);
        assert_eq!(&framed[5..], &[1, 2, 3]);
    }
}
