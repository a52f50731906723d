//! gRPC metadata: the custom headers/trailers carried alongside requests and
//! responses, distinct from the small set of headers gRPC itself reserves.

mod encoding;
mod key;
mod map;
mod value;

pub use self::encoding::{Ascii, Binary, ValueEncoding};
pub use self::key::{AsciiMetadataKey, BinaryMetadataKey, InvalidMetadataKey, MetadataKey};
pub use self::map::{
    AsEncodingAgnosticMetadataKey, AsMetadataKey, Entry, GetAll, IntoMetadataKey, Iter, IterMut,
    KeyRef, Keys, MetadataMap, OccupiedEntry, VacantEntry, ValueIter, ValueRef, ValueRefMut,
    Values, ValuesMut,
};
pub use self::value::{
    AsciiMetadataValue, BinaryMetadataValue, InvalidMetadataValue, InvalidMetadataValueBytes,
    MetadataValue,
};

use http::header::{HeaderName, HeaderValue};

/// The `grpc-timeout` header name.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// The `grpc-encoding` header name.
pub const GRPC_ENCODING_HEADER: &str = "grpc-encoding";

/// The `grpc-accept-encoding` header name.
pub const GRPC_ACCEPT_ENCODING_HEADER: &str = "grpc-accept-encoding";

/// The `content-type` value this crate's [`BinaryCodec`](crate::codec::BinaryCodec)
/// speaks: plain `application/grpc`, no named wire format.
///
/// Codec crates that carry their own format (`application/grpc+proto`, ...)
/// build their own `content-type` value rather than use this constant.
pub const GRPC_CONTENT_TYPE: HeaderValue = HeaderValue::from_static("application/grpc");

/// Returns `true` if `name` is a header gRPC reserves for its own framing
/// (`grpc-status`, `grpc-message`, etc.) and so cannot be set as custom
/// metadata.
#[must_use]
pub fn is_reserved_header(name: &HeaderName) -> bool {
    MetadataMap::GRPC_RESERVED_HEADERS.contains(name)
}
