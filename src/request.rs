use crate::metadata::{MetadataMap, MetadataValue};
use std::time::Duration;

/// A gRPC request: a message plus the metadata and extensions that travel
/// alongside it.
#[derive(Debug)]
pub struct Request<T> {
    metadata: MetadataMap,
    message: T,
    extensions: http::Extensions,
}

/// Converts a value into a [`Request`], so client methods can accept either
/// a bare message or an already-built `Request`.
pub trait IntoRequest<T>: sealed::Sealed {
    /// Wraps `self` in a [`Request`].
    fn into_request(self) -> Request<T>;
}

/// Converts a value into a streaming [`Request`] for client-streaming and
/// bidirectional calls.
pub trait IntoStreamingRequest: sealed::Sealed {
    /// The stream of request messages.
    type Stream: tokio_stream::Stream<Item = Self::Message> + Send + 'static;
    /// The request message type.
    type Message;

    /// Wraps `self` in a streaming [`Request`].
    fn into_streaming_request(self) -> Request<Self::Stream>;
}

impl<T> Request<T> {
    /// Creates a new gRPC request wrapping `message`.
    pub fn new(message: T) -> Self {
        Self {
            metadata: MetadataMap::new(),
            message,
            extensions: http::Extensions::new(),
        }
    }

    /// A reference to the wrapped message.
    pub fn get_ref(&self) -> &T {
        &self.message
    }

    /// A mutable reference to the wrapped message.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.message
    }

    /// The request's metadata.
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Mutable access to the request's metadata.
    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }

    /// A reference to the request's extensions.
    pub fn extensions(&self) -> &http::Extensions {
        &self.extensions
    }

    /// Mutable access to the request's extensions.
    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.extensions
    }

    /// Consumes `self`, returning the wrapped message.
    pub fn into_inner(self) -> T {
        self.message
    }

    /// Consumes `self`, returning its parts.
    pub fn into_parts(self) -> (MetadataMap, http::Extensions, T) {
        (self.metadata, self.extensions, self.message)
    }

    /// Builds a request from its constituent parts.
    pub fn from_parts(metadata: MetadataMap, extensions: http::Extensions, message: T) -> Self {
        Self {
            metadata,
            extensions,
            message,
        }
    }

    pub(crate) fn from_http_parts(parts: http::request::Parts, message: T) -> Self {
        Self {
            metadata: MetadataMap::from_headers(parts.headers),
            message,
            extensions: parts.extensions,
        }
    }

    /// Converts an HTTP request into a gRPC request.
    pub fn from_http(http: http::Request<T>) -> Self {
        let (parts, message) = http.into_parts();
        Self::from_http_parts(parts, message)
    }

    pub(crate) fn into_http(
        self,
        uri: http::Uri,
        method: http::Method,
        version: http::Version,
        sanitize_headers: SanitizeHeaders,
    ) -> http::Request<T> {
        let mut request = http::Request::new(self.message);

        *request.version_mut() = version;
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.headers_mut() = match sanitize_headers {
            SanitizeHeaders::Yes => self.metadata.into_sanitized_headers(),
            SanitizeHeaders::No => self.metadata.into_headers(),
        };
        *request.extensions_mut() = self.extensions;

        if let http::header::Entry::Vacant(entry) =
            request.headers_mut().entry(http::header::USER_AGENT)
        {
            entry.insert(http::HeaderValue::from_static(crate::DEFAULT_USER_AGENT));
        }

        request
    }

    #[doc(hidden)]
    pub fn map<F, U>(self, f: F) -> Request<U>
    where
        F: FnOnce(T) -> U,
    {
        Request {
            metadata: self.metadata,
            message: f(self.message),
            extensions: self.extensions,
        }
    }

    /// Sets the `grpc-timeout` metadata from a deadline, using the most
    /// precise unit that fits in 8 digits.
    pub fn try_set_timeout(&mut self, deadline: Duration) -> Result<(), crate::BoxError> {
        let rendered = duration_to_grpc_timeout(deadline)
            .ok_or("duration is too large to express as a grpc-timeout")?;
        let value: MetadataValue<_> = rendered.parse()?;
        self.metadata_mut()
            .insert(crate::metadata::GRPC_TIMEOUT_HEADER, value);
        Ok(())
    }
}

impl<T> IntoRequest<T> for T {
    fn into_request(self) -> Request<Self> {
        Request::new(self)
    }
}

impl<T> IntoRequest<T> for Request<T> {
    fn into_request(self) -> Self {
        self
    }
}

impl<T> IntoStreamingRequest for T
where
    T: tokio_stream::Stream + Send + 'static,
{
    type Stream = T;
    type Message = T::Item;

    fn into_streaming_request(self) -> Request<Self> {
        Request::new(self)
    }
}

impl<T> IntoStreamingRequest for Request<T>
where
    T: tokio_stream::Stream + Send + 'static,
{
    type Stream = T;
    type Message = T::Item;

    fn into_streaming_request(self) -> Self {
        self
    }
}

impl<T> sealed::Sealed for T {}

mod sealed {
    pub trait Sealed {}
}

/// Formats a [`Duration`] as a `grpc-timeout` value: `1*8DIGIT` plus a unit
/// (`H`/`M`/`S`/`m`/`u`/`n`), picking the most precise unit whose magnitude
/// still fits in 8 digits.
pub(crate) fn duration_to_grpc_timeout(duration: Duration) -> Option<String> {
    fn try_format<T: Into<u128>>(
        duration: Duration,
        unit: char,
        convert: impl FnOnce(Duration) -> T,
    ) -> Option<String> {
        const MAX_SIZE: u128 = 99_999_999; // exactly 8 digits
        let value = convert(duration).into();
        if value > MAX_SIZE {
            None
        } else {
            Some(format!("{value}{unit}"))
        }
    }

    try_format(duration, 'n', |d| d.as_nanos())
        .or_else(|| try_format(duration, 'u', |d| d.as_micros()))
        .or_else(|| try_format(duration, 'm', |d| d.as_millis()))
        .or_else(|| try_format(duration, 'S', |d| d.as_secs() as u128))
        .or_else(|| try_format(duration, 'M', |d| (d.as_secs() / 60) as u128))
        .or_else(|| try_format(duration, 'H', |d| (d.as_secs() / 3600) as u128))
}

/// Whether converting a [`Request`] into an `http::Request` should drop
/// gRPC-reserved headers first.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SanitizeHeaders {
    Yes,
    #[allow(dead_code)]
    No,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataKey, MetadataValue};

    #[test]
    fn reserved_headers_are_excluded() {
        let mut r = Request::new(1);

        for header in &MetadataMap::GRPC_RESERVED_HEADERS {
            r.metadata_mut().insert(
                MetadataKey::unchecked_from_header_name(header.clone()),
                MetadataValue::from_static("invalid"),
            );
        }

        let http_request = r.into_http(
            http::Uri::default(),
            http::Method::POST,
            http::Version::HTTP_2,
            SanitizeHeaders::Yes,
        );
        assert_eq!(1, http_request.headers().len());
        assert!(http_request.headers().contains_key(http::header::USER_AGENT));
    }

    #[test]
    fn preserves_user_agent() {
        let mut r = Request::new(1);

        r.metadata_mut()
            .insert("user-agent", MetadataValue::from_static("Custom/1.2.3"));

        let http_request = r.into_http(
            http::Uri::default(),
            http::Method::POST,
            http::Version::HTTP_2,
            SanitizeHeaders::Yes,
        );
        let user_agent = http_request.headers().get("user-agent").unwrap();
        assert_eq!(user_agent, "Custom/1.2.3");
    }

    #[test]
    fn duration_to_grpc_timeout_less_than_second() {
        let timeout = Duration::from_millis(500);
        let value = duration_to_grpc_timeout(timeout).unwrap();
        assert_eq!(value, format!("{}u", timeout.as_micros()));
    }

    #[test]
    fn duration_to_grpc_timeout_a_very_long_time() {
        let one_hour = Duration::from_secs(60 * 60);
        let value = duration_to_grpc_timeout(one_hour).unwrap();
        assert_eq!(value, format!("{}m", one_hour.as_millis()));
    }

    #[test]
    fn eight_digit_boundary_picks_next_unit() {
        let timeout = Duration::from_nanos(100_000_000);
        let value = duration_to_grpc_timeout(timeout).unwrap();
        assert!(value.ends_with('u') || value.ends_with('n'));
    }
}
