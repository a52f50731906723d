//! Message codecs: how an RPC's request/response payloads are turned into
//! length-prefixed frames and back.
//!
//! This crate does not ship a protobuf codec — that's left to a sibling
//! crate generated from `.proto` files. What it ships is the `Codec` trait
//! seam itself, the framing machinery both sides of that seam share
//! ([`EncodeBody`](encode::EncodeBody), [`Streaming`](decode::Streaming)),
//! and one concrete, trivial codec ([`BinaryCodec`]) for opaque byte
//! payloads.

pub(crate) mod compression;
mod decode;
mod encode;
mod negotiation;

pub use compression::{CompressionEncoding, EnabledCompressionEncodings, SingleMessageCompressionOverride};
pub use decode::Streaming;
pub use encode::EncodeBody;
pub use negotiation::{CompressionNegotiationFailed, Negotiation, PeerSupported};

use bytes::{Buf, BufMut, BytesMut};
use std::borrow::Cow;
use std::marker::PhantomData;

use crate::status::Status;

/// Growth hints for the buffers a [`Codec`]'s encoder/decoder use.
#[derive(Debug, Clone, Copy)]
pub struct BufferSettings {
    pub(crate) buffer_size: usize,
    pub(crate) yield_threshold: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            buffer_size: 8 * 1024,
            yield_threshold: 32 * 1024,
        }
    }
}

impl BufferSettings {
    /// Creates new buffer settings.
    #[must_use]
    pub fn new(buffer_size: usize, yield_threshold: usize) -> Self {
        Self {
            buffer_size,
            yield_threshold,
        }
    }
}

/// A growable buffer an [`Encoder`] writes an encoded message into.
#[derive(Debug)]
pub struct EncodeBuf<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> EncodeBuf<'a> {
    pub(crate) fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }
}

impl std::ops::Deref for EncodeBuf<'_> {
    type Target = dyn BufMut;

    fn deref(&self) -> &Self::Target {
        self.buf as _
    }
}

impl std::ops::DerefMut for EncodeBuf<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf as _
    }
}

unsafe impl BufMut for EncodeBuf<'_> {
    fn remaining_mut(&self) -> usize {
        self.buf.remaining_mut()
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        unsafe {
            self.buf.advance_mut(cnt);
        }
    }

    fn chunk_mut(&mut self) -> &mut bytes::buf::UninitSlice {
        self.buf.chunk_mut()
    }
}

/// A buffer a [`Decoder`] reads an incoming message's bytes from.
#[derive(Debug)]
pub struct DecodeBuf<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> DecodeBuf<'a> {
    pub(crate) fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }
}

impl std::ops::Deref for DecodeBuf<'_> {
    type Target = dyn Buf;

    fn deref(&self) -> &Self::Target {
        self.buf as _
    }
}

impl std::ops::DerefMut for DecodeBuf<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf as _
    }
}

impl Buf for DecodeBuf<'_> {
    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn chunk(&self) -> &[u8] {
        self.buf.chunk()
    }

    fn advance(&mut self, cnt: usize) {
        self.buf.advance(cnt);
    }
}

/// Encodes a single message of type `Self::Item` into an [`EncodeBuf`].
pub trait Encoder {
    type Item;
    type Error;

    /// Encodes `item` into `dst`.
    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error>;
}

/// Decodes a single message of type `Self::Item` from a [`DecodeBuf`].
///
/// Returns `Ok(None)` if `src` doesn't yet contain a complete message — the
/// caller is expected to buffer more bytes and try again.
pub trait Decoder {
    type Item;
    type Error;

    /// Attempts to decode one message out of `src`.
    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error>;
}

/// The capability an RPC method needs: an encoder for its request/response
/// type and a decoder for the other side.
///
/// This is the seam application codecs (protobuf, JSON, this crate's own
/// [`BinaryCodec`]) plug into; `grpc-core` routes and frames messages purely
/// in terms of this trait, never caring what `Encode`/`Decode` actually are.
pub trait Codec {
    type Encode: Send + 'static;
    type Decode: Send + 'static;

    type Encoder: Encoder<Item = Self::Encode, Error = Status> + Send + 'static;
    type Decoder: Decoder<Item = Self::Decode, Error = Status> + Send + 'static;

    /// Returns a new encoder.
    fn encoder(&mut self) -> Self::Encoder;

    /// Returns a new decoder.
    fn decoder(&mut self) -> Self::Decoder;
}

/// A `Codec` that treats messages as opaque byte buffers — no schema, no
/// interpretation, just length-prefixed passthrough.
///
/// This realizes the "binary RPC" case: services that want gRPC's framing,
/// compression and status-propagation machinery without committing to a
/// particular payload format.
#[derive(Debug, Clone, Default)]
pub struct BinaryCodec<T = Vec<u8>> {
    _marker: PhantomData<T>,
}

impl<T> BinaryCodec<T> {
    /// Creates a new `BinaryCodec`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl Codec for BinaryCodec<Vec<u8>> {
    type Encode = Vec<u8>;
    type Decode = Vec<u8>;
    type Encoder = BinaryEncoder;
    type Decoder = BinaryDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        BinaryEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        BinaryDecoder
    }
}

/// The [`Encoder`] half of [`BinaryCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryEncoder;

impl Encoder for BinaryEncoder {
    type Item = Vec<u8>;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put_slice(&item);
        Ok(())
    }
}

/// The [`Decoder`] half of [`BinaryCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryDecoder;

impl Decoder for BinaryDecoder {
    type Item = Vec<u8>;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let len = src.remaining();
        if len == 0 {
            return Ok(Some(Vec::new()));
        }
        let mut out = vec![0u8; len];
        src.copy_to_slice(&mut out);
        Ok(Some(out))
    }
}

/// How many request/response streams an RPC method has, in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamingType {
    /// One request, one response.
    NonStreaming,
    /// A stream of requests, one response.
    ClientStreaming,
    /// One request, a stream of responses.
    ServerStreaming,
    /// A stream of requests, a stream of responses.
    BiDiStreaming,
}

impl StreamingType {
    /// Whether calls of this kind send more than one request message.
    #[must_use]
    pub fn client_streams(self) -> bool {
        matches!(self, Self::ClientStreaming | Self::BiDiStreaming)
    }

    /// Whether calls of this kind receive more than one response message.
    #[must_use]
    pub fn server_streams(self) -> bool {
        matches!(self, Self::ServerStreaming | Self::BiDiStreaming)
    }
}

/// Describes one RPC method for server-side routing: which path it's
/// reachable at, what message format it expects, and its streaming shape.
///
/// A `Router` (see [`crate::server::Router`]) is, at heart, a `path -> RpcDescriptor`
/// table; this type is what lets it dispatch a request without knowing
/// anything about the concrete `Codec`/handler behind the path.
#[derive(Debug, Clone)]
pub struct RpcDescriptor {
    /// The fully qualified method name, e.g. `/package.Service/Method`.
    pub path: Cow<'static, str>,
    /// The wire format name used in `application/grpc+{format}`, e.g.
    /// `proto` or `json`. `None` means plain `application/grpc` (this
    /// crate's `BinaryCodec` uses `None`).
    pub format: Option<Cow<'static, str>>,
    /// The method's streaming arity.
    pub streaming: StreamingType,
}

impl RpcDescriptor {
    /// Creates a descriptor for a method at `path` with no named format
    /// (`application/grpc`, suitable for [`BinaryCodec`]).
    #[must_use]
    pub fn new(path: impl Into<Cow<'static, str>>, streaming: StreamingType) -> Self {
        Self {
            path: path.into(),
            format: None,
            streaming,
        }
    }

    /// Sets a named wire format (`application/grpc+{format}`).
    #[must_use]
    pub fn with_format(mut self, format: impl Into<Cow<'static, str>>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// The content-type this descriptor expects/produces.
    #[must_use]
    pub fn content_type(&self) -> String {
        match &self.format {
            Some(format) => format!("application/grpc+{format}"),
            None => "application/grpc".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_codec_roundtrip() {
        let mut codec = BinaryCodec::<Vec<u8>>::new();
        let mut buf = BytesMut::new();
        let mut encode_buf = EncodeBuf::new(&mut buf);
        codec.encoder().encode(vec![1, 2, 3], &mut encode_buf).unwrap();

        let mut decode_buf = DecodeBuf::new(&mut buf);
        let decoded = codec.decoder().decode(&mut decode_buf).unwrap().unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn descriptor_content_type() {
        let d = RpcDescriptor::new("/pkg.Svc/Method", StreamingType::NonStreaming);
        assert_eq!(d.content_type(), "application/grpc");

        let d = d.with_format("proto");
        assert_eq!(d.content_type(), "application/grpc+proto");
    }

    #[test]
    fn streaming_type_arity() {
        assert!(!StreamingType::NonStreaming.client_streams());
        assert!(StreamingType::ClientStreaming.client_streams());
        assert!(StreamingType::ServerStreaming.server_streams());
        assert!(StreamingType::BiDiStreaming.client_streams());
        assert!(StreamingType::BiDiStreaming.server_streams());
    }
}
