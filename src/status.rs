//! The gRPC `Code`/`Status` error model: the `grpc-status` / `grpc-message` /
//! `grpc-status-details-bin` trailers a call resolves to, and the glue that
//! turns ordinary Rust errors into them.

use crate::metadata::{Ascii, MetadataMap, MetadataValue};
use base64::Engine as _;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue};
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

const GRPC_STATUS_HEADER: &str = "grpc-status";
const GRPC_MESSAGE_HEADER: &str = "grpc-message";
const GRPC_STATUS_DETAILS_HEADER: &str = "grpc-status-details-bin";

/// A gRPC status code, the `0..=16` space defined by the protocol.
///
/// Values outside this range don't exist as a distinct `Code` — decoding
/// them (via [`Code::from_i32`] or [`Code::from_bytes`]) saturates to
/// [`Code::Unknown`], which is the total, not-quite-bijective mapping this
/// crate uses in place of an `Option<Code>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Human-readable description, matching the gRPC spec's status table.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Ok => "The operation completed successfully",
            Self::Cancelled => "The operation was cancelled",
            Self::Unknown => "Unknown error",
            Self::InvalidArgument => "Client specified an invalid argument",
            Self::DeadlineExceeded => "Deadline expired before operation could complete",
            Self::NotFound => "Some requested entity was not found",
            Self::AlreadyExists => "Some entity that we attempted to create already exists",
            Self::PermissionDenied => {
                "The caller does not have permission to execute the specified operation"
            }
            Self::ResourceExhausted => "Some resource has been exhausted",
            Self::FailedPrecondition => {
                "The system is not in a state required for the operation's execution"
            }
            Self::Aborted => "The operation was aborted",
            Self::OutOfRange => "Operation was attempted past the valid range",
            Self::Unimplemented => "Operation is not implemented or not supported",
            Self::Internal => "Internal error",
            Self::Unavailable => "The service is currently unavailable",
            Self::DataLoss => "Unrecoverable data loss or corruption",
            Self::Unauthenticated => {
                "The request does not have valid authentication credentials"
            }
        }
    }

    /// Decodes a numeric status code, saturating out-of-range values to
    /// [`Code::Unknown`].
    #[must_use]
    pub fn from_i32(i: i32) -> Self {
        match i {
            0 => Self::Ok,
            1 => Self::Cancelled,
            2 => Self::Unknown,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }

    /// Parses the value of a `grpc-status` header.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .map_or(Self::Unknown, Self::from_i32)
    }

    pub(crate) fn to_header_value(self) -> HeaderValue {
        HeaderValue::from_static(match self {
            Self::Ok => "0",
            Self::Cancelled => "1",
            Self::Unknown => "2",
            Self::InvalidArgument => "3",
            Self::DeadlineExceeded => "4",
            Self::NotFound => "5",
            Self::AlreadyExists => "6",
            Self::PermissionDenied => "7",
            Self::ResourceExhausted => "8",
            Self::FailedPrecondition => "9",
            Self::Aborted => "10",
            Self::OutOfRange => "11",
            Self::Unimplemented => "12",
            Self::Internal => "13",
            Self::Unavailable => "14",
            Self::DataLoss => "15",
            Self::Unauthenticated => "16",
        })
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A gRPC status: the `Code` plus the human-readable message and any binary
/// details that travel with it in the response trailers.
#[derive(Clone)]
pub struct Status {
    code: Code,
    message: Cow<'static, str>,
    details: Bytes,
    metadata: MetadataMap,
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("Status");
        builder.field("code", &self.code);
        if !self.message.is_empty() {
            builder.field("message", &self.message);
        }
        if !self.details.is_empty() {
            builder.field("details", &self.details);
        }
        if !self.metadata.is_empty() {
            builder.field("metadata", &self.metadata);
        }
        if let Some(source) = &self.source {
            builder.field("source", source);
        }
        builder.finish()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status: {:?}, message: {:?}", self.code, self.message)?;
        if !self.details.is_empty() {
            write!(f, ", details: {:?}", self.details)?;
        }
        Ok(())
    }
}

impl StdError for Status {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|s| {
            let s: &(dyn StdError + 'static) = s.as_ref();
            s
        })
    }
}

macro_rules! status_ctor {
    ($name:ident, $code:expr) => {
        #[doc = concat!("Creates a new `Status` with code [`Code::", stringify!($code), "`].")]
        #[must_use]
        pub fn $name(message: impl Into<Cow<'static, str>>) -> Self {
            Self::new($code, message)
        }
    };
}

impl Status {
    /// Creates a new `Status` from a code and message.
    #[must_use]
    pub fn new(code: Code, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Bytes::new(),
            metadata: MetadataMap::new(),
            source: None,
        }
    }

    /// The `Ok` status — callers generally won't construct this directly
    /// since a successful call has no trailers-only `Status` at all, but it
    /// is useful when building a uniform result type.
    #[must_use]
    pub fn ok(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Code::Ok, message)
    }

    status_ctor!(cancelled, Code::Cancelled);
    status_ctor!(unknown, Code::Unknown);
    status_ctor!(invalid_argument, Code::InvalidArgument);
    status_ctor!(deadline_exceeded, Code::DeadlineExceeded);
    status_ctor!(not_found, Code::NotFound);
    status_ctor!(already_exists, Code::AlreadyExists);
    status_ctor!(permission_denied, Code::PermissionDenied);
    status_ctor!(resource_exhausted, Code::ResourceExhausted);
    status_ctor!(failed_precondition, Code::FailedPrecondition);
    status_ctor!(aborted, Code::Aborted);
    status_ctor!(out_of_range, Code::OutOfRange);
    status_ctor!(unimplemented, Code::Unimplemented);
    status_ctor!(internal, Code::Internal);
    status_ctor!(unavailable, Code::Unavailable);
    status_ctor!(data_loss, Code::DataLoss);
    status_ctor!(unauthenticated, Code::Unauthenticated);

    /// This status's code.
    #[must_use]
    pub fn code(&self) -> Code {
        self.code
    }

    /// This status's message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raw `grpc-status-details-bin` payload, if any.
    #[must_use]
    pub fn details(&self) -> &[u8] {
        &self.details
    }

    /// Any additional metadata attached to the trailers.
    #[must_use]
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Mutable access to the trailer metadata.
    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }

    /// Attaches binary details (encoded as `grpc-status-details-bin`).
    #[must_use]
    pub fn with_details(mut self, details: Bytes) -> Self {
        self.details = details;
        self
    }

    /// Attaches metadata to the trailers.
    #[must_use]
    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attaches both details and metadata in one call.
    #[must_use]
    pub fn with_details_and_metadata(mut self, details: Bytes, metadata: MetadataMap) -> Self {
        self.details = details;
        self.metadata = metadata;
        self
    }

    /// Builds a `Status` from an arbitrary boxed error, walking its source
    /// chain to find one it can derive a more precise code from.
    #[must_use]
    pub fn from_error(err: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self::try_from_error(err).unwrap_or_else(|err| {
            let mut status = Self::new(Code::Unknown, err.to_string());
            status.source = Some(Arc::from(err));
            status
        })
    }

    /// Like [`Self::from_error`], but accepts any error convertible into
    /// the boxed form — the convenience entry point transport-level `?`/
    /// `map_err` call sites use instead of boxing by hand first.
    #[must_use]
    pub fn from_error_generic(err: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::from_error(err.into())
    }

    /// Like [`Self::from_error`], but returns the original error unchanged
    /// if no `Status` could be derived from the source chain (i.e. the
    /// caller should fall back to its own default code).
    pub fn try_from_error(
        err: Box<dyn StdError + Send + Sync + 'static>,
    ) -> Result<Self, Box<dyn StdError + Send + Sync + 'static>> {
        if let Some(found) = find_status_in_source_chain(err.as_ref()) {
            return Ok(found);
        }
        Err(err)
    }

    /// Parses a `Status` out of response trailers (`grpc-status`,
    /// `grpc-message`, `grpc-status-details-bin`) plus any other metadata.
    #[must_use]
    pub fn from_header_map(headers: &HeaderMap) -> Option<Self> {
        let code = Code::from_bytes(headers.get(GRPC_STATUS_HEADER)?.as_bytes());

        let message = headers
            .get(GRPC_MESSAGE_HEADER)
            .map(|value| {
                percent_encoding::percent_decode(value.as_bytes())
                    .decode_utf8_lossy()
                    .into_owned()
            })
            .unwrap_or_default();

        let details = headers
            .get(GRPC_STATUS_DETAILS_HEADER)
            .and_then(|value| {
                base64::engine::general_purpose::STANDARD_NO_PAD
                    .decode(value.as_bytes())
                    .or_else(|_| base64::engine::general_purpose::STANDARD.decode(value.as_bytes()))
                    .ok()
            })
            .map(Bytes::from)
            .unwrap_or_default();

        let mut metadata = MetadataMap::from_headers(headers.clone());
        metadata.remove(GRPC_STATUS_HEADER);
        metadata.remove(GRPC_MESSAGE_HEADER);
        metadata.remove(GRPC_STATUS_DETAILS_HEADER);

        Some(Self {
            code,
            message: Cow::Owned(message),
            details,
            metadata,
            source: None,
        })
    }

    /// Writes this status's trailers into an existing `HeaderMap` (used for
    /// both a dedicated trailers frame, and a trailers-only response).
    pub fn add_header(&self, headers: &mut HeaderMap) -> Result<(), InvalidStatusHeader> {
        headers.insert(GRPC_STATUS_HEADER, self.code.to_header_value());

        if !self.message.is_empty() {
            let encoded = percent_encoding::percent_encode(
                self.message.as_bytes(),
                PERCENT_ENCODE_SET,
            )
            .to_string();
            headers.insert(
                GRPC_MESSAGE_HEADER,
                HeaderValue::from_str(&encoded).map_err(|_| InvalidStatusHeader::new())?,
            );
        }

        if !self.details.is_empty() {
            let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(&self.details);
            headers.insert(
                GRPC_STATUS_DETAILS_HEADER,
                HeaderValue::from_str(&encoded).map_err(|_| InvalidStatusHeader::new())?,
            );
        }

        for (key, value) in self.metadata.clone().into_sanitized_headers() {
            if let Some(key) = key {
                headers.insert(key, value);
            }
        }

        Ok(())
    }

    /// Renders this status as a standalone `HeaderMap` suitable for a
    /// trailers-only response.
    #[must_use]
    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(3 + self.metadata.len());
        let _ = self.add_header(&mut headers);
        headers
    }

    /// Builds a Trailers-Only response: the fusion of
    /// headers and trailers into a single HEADERS frame, `content-type`
    /// included, body empty. This is how the server side reports any
    /// protocol-level or pre-body failure — peers see `grpc-status` on the
    /// response headers themselves rather than waiting for a trailer frame
    /// that never arrives.
    #[must_use]
    pub fn to_http_response(&self) -> http::Response<crate::body::Body> {
        let mut response = http::Response::new(crate::body::Body::empty());
        *response.status_mut() = http::StatusCode::OK;
        response
            .headers_mut()
            .insert(http::header::CONTENT_TYPE, crate::metadata::GRPC_CONTENT_TYPE);
        let _ = self.add_header(response.headers_mut());
        response
    }
}

const PERCENT_ENCODE_SET: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
    .remove(b' ')
    .remove(b'"')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b',')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'<')
    .remove(b'>')
    .remove(b'?')
    .remove(b'[')
    .remove(b']')
    .remove(b'{')
    .remove(b'}');

/// Marker error used to report a `Status` couldn't be serialized into
/// ASCII-safe header bytes.
#[derive(Debug, Default)]
pub struct InvalidStatusHeader {
    _priv: (),
}

impl InvalidStatusHeader {
    fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for InvalidStatusHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid status header value")
    }
}

impl StdError for InvalidStatusHeader {}

/// Marks a connection error caused by an expired deadline, so
/// [`find_status_in_source_chain`] can map it to [`Code::DeadlineExceeded`].
#[derive(Debug)]
pub struct TimeoutExpired(());

impl TimeoutExpired {
    /// Constructs a new marker error.
    #[must_use]
    pub fn new() -> Self {
        Self(())
    }
}

impl Default for TimeoutExpired {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimeoutExpired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("timeout expired")
    }
}

impl StdError for TimeoutExpired {}

/// Marks a connection error caused by a failed connect attempt, so
/// [`find_status_in_source_chain`] can map it to [`Code::Unavailable`].
#[derive(Debug)]
pub struct ConnectError(Box<dyn StdError + Send + Sync + 'static>);

impl ConnectError {
    /// Wraps the lower-level connect error.
    pub fn new(err: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self(err.into())
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection error: {}", self.0)
    }
}

impl StdError for ConnectError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Walks `err`'s source chain looking for something this crate can turn
/// into a `Status` directly: an existing `Status`, an `h2` stream reset
/// (feature `server`), a [`TimeoutExpired`], or a [`ConnectError`].
fn find_status_in_source_chain(err: &(dyn StdError + 'static)) -> Option<Status> {
    let mut source = Some(err);

    while let Some(err) = source {
        if let Some(status) = err.downcast_ref::<Status>() {
            return Some(status.clone());
        }

        #[cfg(feature = "server")]
        if let Some(h2_err) = err.downcast_ref::<h2::Error>() {
            return Some(from_h2_error(h2_err));
        }

        if err.downcast_ref::<TimeoutExpired>().is_some() {
            return Some(Status::deadline_exceeded("deadline exceeded"));
        }

        if let Some(connect_err) = err.downcast_ref::<ConnectError>() {
            return Some(Status::unavailable(connect_err.to_string()));
        }

        source = err.source();
    }

    None
}

#[cfg(feature = "server")]
fn from_h2_error(err: &h2::Error) -> Status {
    let code = err
        .reason()
        .map(code_from_h2_reason)
        .unwrap_or(Code::Internal);
    Status::new(code, format!("h2 protocol error: {err}"))
}

#[cfg(feature = "server")]
fn code_from_h2_reason(reason: h2::Reason) -> Code {
    match reason {
        h2::Reason::NO_ERROR | h2::Reason::CANCEL => Code::Cancelled,
        h2::Reason::ENHANCE_YOUR_CALM => Code::ResourceExhausted,
        h2::Reason::INADEQUATE_SECURITY => Code::PermissionDenied,
        _ => Code::Internal,
    }
}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let code = match err.kind() {
            ErrorKind::NotFound => Code::NotFound,
            ErrorKind::PermissionDenied => Code::PermissionDenied,
            ErrorKind::AlreadyExists => Code::AlreadyExists,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => Code::InvalidArgument,
            ErrorKind::TimedOut => Code::DeadlineExceeded,
            ErrorKind::Interrupted => Code::Unavailable,
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                Code::Unavailable
            }
            _ => Code::Unknown,
        };
        Status::new(code, err.to_string())
    }
}

/// Maps an HTTP status code to the gRPC code a peer should infer when a
/// response has no trailers at all (the connection died, a proxy returned a
/// plain HTTP error, etc.) — see `http-grpc-status-mapping.md` in the gRPC
/// spec.
#[must_use]
pub fn infer_grpc_status(
    trailers: Option<&HeaderMap>,
    status_code: http::StatusCode,
) -> Result<(), Status> {
    if let Some(trailers) = trailers {
        if let Some(status) = Status::from_header_map(trailers) {
            return if status.code() == Code::Ok {
                Ok(())
            } else {
                Err(status)
            };
        }
    }

    let code = match status_code {
        http::StatusCode::BAD_REQUEST => Code::Internal,
        http::StatusCode::UNAUTHORIZED => Code::Unauthenticated,
        http::StatusCode::FORBIDDEN => Code::PermissionDenied,
        http::StatusCode::NOT_FOUND => Code::Unimplemented,
        http::StatusCode::TOO_MANY_REQUESTS
        | http::StatusCode::BAD_GATEWAY
        | http::StatusCode::SERVICE_UNAVAILABLE
        | http::StatusCode::GATEWAY_TIMEOUT => Code::Unavailable,
        status if status.is_success() => {
            return Err(Status::internal("missing grpc-status trailer"));
        }
        _ => Code::Unknown,
    };

    Err(Status::new(
        code,
        format!("unexpected HTTP status code {status_code}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_from_i32_roundtrip() {
        for i in 0..=16 {
            assert_eq!(Code::from_i32(i) as i32, i);
        }
        assert_eq!(Code::from_i32(999), Code::Unknown);
        assert_eq!(Code::from_i32(-1), Code::Unknown);
    }

    #[test]
    fn constructors_set_code_and_message() {
        let status = Status::not_found("missing");
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "missing");
    }

    #[test]
    fn header_roundtrip() {
        let status = Status::invalid_argument("bad input").with_details(Bytes::from_static(b"\x01\x02"));
        let headers = status.to_header_map();
        let parsed = Status::from_header_map(&headers).unwrap();
        assert_eq!(parsed.code(), Code::InvalidArgument);
        assert_eq!(parsed.message(), "bad input");
        assert_eq!(parsed.details(), b"\x01\x02");
    }

    #[test]
    fn message_is_percent_encoded() {
        let status = Status::internal("broken: \"quoted\"\nline");
        let headers = status.to_header_map();
        let raw = headers.get(GRPC_MESSAGE_HEADER).unwrap();
        assert!(raw.to_str().unwrap().is_ascii());
        let parsed = Status::from_header_map(&headers).unwrap();
        assert_eq!(parsed.message(), "broken: \"quoted\"\nline");
    }

    #[test]
    fn from_error_unwraps_nested_status() {
        let inner = Status::already_exists("dup");
        let wrapped: Box<dyn StdError + Send + Sync> =
            Box::new(std::io::Error::new(std::io::ErrorKind::Other, inner));
        let status = Status::from_error(wrapped);
        assert_eq!(status.code(), Code::AlreadyExists);
    }

    #[test]
    fn from_error_falls_back_to_unknown() {
        let err: Box<dyn StdError + Send + Sync> =
            Box::new(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let status = Status::from_error(err);
        assert_eq!(status.code(), Code::Unknown);
    }

    #[test]
    fn infer_status_maps_http_codes() {
        let status = infer_grpc_status(None, http::StatusCode::NOT_FOUND).unwrap_err();
        assert_eq!(status.code(), Code::Unimplemented);
        let status = infer_grpc_status(None, http::StatusCode::UNAUTHORIZED).unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }
}
