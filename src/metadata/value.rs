use super::encoding::{Ascii, Binary, ValueEncoding};
use std::convert::TryFrom;
use std::error::Error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

use http::header::HeaderValue;

/// A custom metadata value, parameterized by whether it's stored as plain
/// ascii or base64-encoded binary.
///
/// Obtained by parsing ascii/binary metadata entries out of a
/// [`MetadataMap`](super::MetadataMap), or built directly with
/// [`MetadataValue::from_static`] / [`MetadataValue::from_bytes`] /
/// [`MetadataValue::from_str`].
#[repr(transparent)]
pub struct MetadataValue<VE: ValueEncoding> {
    // Invariant: for `Binary`, `inner` holds the base64-encoded bytes, not
    // the raw decoded payload — decoding happens on access via `to_bytes`.
    pub(crate) inner: HeaderValue,
    phantom: PhantomData<VE>,
}

/// An ascii metadata value.
pub type AsciiMetadataValue = MetadataValue<Ascii>;
/// A binary metadata value.
pub type BinaryMetadataValue = MetadataValue<Binary>;

/// Error returned when a metadata value fails to parse or validate.
#[derive(Debug, Default)]
pub struct InvalidMetadataValue {
    _priv: (),
}

/// Error returned when a binary metadata value's base64 payload doesn't
/// decode, or an ascii value isn't valid UTF-8.
#[derive(Debug)]
pub struct InvalidMetadataValueBytes(InvalidMetadataValue);

impl<VE: ValueEncoding> MetadataValue<VE> {
    /// Converts a static string to a `MetadataValue`.
    ///
    /// Panics when the value is not valid, so this is best reserved for
    /// literals known to be valid ahead of time.
    #[must_use]
    pub fn from_static(src: &'static str) -> Self {
        let inner = HeaderValue::from_static(src);

        if !VE::is_valid_value(inner.as_bytes()) {
            panic!("invalid metadata value");
        }

        Self {
            inner,
            phantom: PhantomData,
        }
    }

    /// Attempts to convert a byte slice to a `MetadataValue`.
    pub fn from_bytes(src: &[u8]) -> Result<Self, InvalidMetadataValue> {
        let inner = HeaderValue::from_bytes(src).map_err(|_| InvalidMetadataValue::new())?;

        if !VE::is_valid_value(inner.as_bytes()) {
            return Err(InvalidMetadataValue::new());
        }

        Ok(Self {
            inner,
            phantom: PhantomData,
        })
    }

    /// Returns `true` if the value contains only visible ascii characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the length, in bytes, of the *wire* representation of this
    /// value (for `Binary`, this is the base64-encoded length).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn unchecked_from_header_value(inner: HeaderValue) -> Self {
        Self {
            inner,
            phantom: PhantomData,
        }
    }

    pub(crate) fn unchecked_from_header_value_ref(inner: &HeaderValue) -> &Self {
        unsafe { &*(inner as *const HeaderValue as *const Self) }
    }
}

impl AsciiMetadataValue {
    /// Yields the underlying string, if it's valid UTF-8 (ascii metadata
    /// values always are, since [`HeaderValue`] enforces visible-ascii).
    pub fn to_str(&self) -> Result<&str, InvalidMetadataValueBytes> {
        self.inner
            .to_str()
            .map_err(|_| InvalidMetadataValueBytes(InvalidMetadataValue::new()))
    }
}

impl BinaryMetadataValue {
    /// Attempts to convert bytes to a `MetadataValue<Binary>`, base64
    /// encoding them along the way.
    #[must_use]
    pub fn from_bytes(src: &[u8]) -> Self {
        let encoded = Binary::encode(src);
        // SAFETY: base64 output is always a valid HeaderValue.
        let inner = HeaderValue::from_bytes(&encoded).expect("base64 output is valid ascii");
        Self {
            inner,
            phantom: PhantomData,
        }
    }

    /// Decodes the base64 payload back to raw bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, InvalidMetadataValueBytes> {
        Binary::decode(self.inner.as_bytes())
            .map_err(|_| InvalidMetadataValueBytes(InvalidMetadataValue::new()))
    }
}

impl<VE: ValueEncoding> Clone for MetadataValue<VE> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            phantom: PhantomData,
        }
    }
}

impl<VE: ValueEncoding> PartialEq for MetadataValue<VE> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<VE: ValueEncoding> Eq for MetadataValue<VE> {}

impl<VE: ValueEncoding> Hash for MetadataValue<VE> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl<VE: ValueEncoding> fmt::Debug for MetadataValue<VE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        VE::fmt(self.inner.as_bytes(), f)
    }
}

impl<VE: ValueEncoding> FromStr for MetadataValue<VE> {
    type Err = InvalidMetadataValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

impl<VE: ValueEncoding> TryFrom<String> for MetadataValue<VE> {
    type Error = InvalidMetadataValue;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_bytes(s.as_bytes())
    }
}

impl<VE: ValueEncoding> AsRef<[u8]> for MetadataValue<VE> {
    fn as_ref(&self) -> &[u8] {
        self.inner.as_bytes()
    }
}

impl InvalidMetadataValue {
    #[doc(hidden)]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for InvalidMetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid gRPC metadata value")
    }
}

impl Error for InvalidMetadataValue {}

impl fmt::Display for InvalidMetadataValueBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid gRPC metadata value bytes")
    }
}

impl Error for InvalidMetadataValueBytes {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_roundtrip() {
        let v = AsciiMetadataValue::from_static("hello");
        assert_eq!(v.to_str().unwrap(), "hello");
    }

    #[test]
    fn binary_roundtrip() {
        let v = BinaryMetadataValue::from_bytes(b"\x00\x01\xff");
        assert_eq!(v.to_bytes().unwrap(), b"\x00\x01\xff");
    }

    #[test]
    fn binary_accepts_padded_and_unpadded() {
        let unpadded = BinaryMetadataValue::from_bytes(b"hello world").inner.clone();
        assert!(!unpadded.to_str().unwrap().contains('='));

        let padded = HeaderValue::from_static("aGVsbG8gd29ybGQ=");
        let value = MetadataValue::<Binary>::unchecked_from_header_value(padded);
        assert_eq!(value.to_bytes().unwrap(), b"hello world");
    }
}
