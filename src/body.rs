//! The concrete `http_body::Body` type used for gRPC request/response
//! bodies throughout the crate, and small helpers for building one from an
//! already-available buffer or an arbitrary body implementation.

use bytes::Bytes;
use http_body::Body as HttpBody;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::BodyExt;

use crate::status::Status;

/// A type-erased gRPC body: either a request body en route to a handler, or
/// a response body en route to a caller. Boxed because the concrete body
/// type differs (an `EncodeBody<S>` wrapping a message stream, an empty
/// body, `hyper`'s incoming body, ...) depending on where it's constructed.
pub struct Body {
    inner: UnsyncBoxBody<Bytes, Status>,
}

impl Body {
    /// Wraps any compatible body, boxing and erasing its error type into
    /// [`Status`].
    pub fn new<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<crate::BoxError>,
    {
        Self {
            inner: body
                .map_err(|e| Status::from_error(e.into()))
                .boxed_unsync(),
        }
    }

    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(http_body_util::Empty::new().map_err(|never: std::convert::Infallible| match never {}))
    }

    /// Wraps a single, already-available chunk of bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(
            http_body_util::Full::new(bytes.into())
                .map_err(|never: std::convert::Infallible| match never {}),
        )
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = Status;

    fn poll_frame(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        let inner = std::pin::Pin::new(&mut self.get_mut().inner);
        inner.poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body").finish()
    }
}
