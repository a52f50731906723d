use std::fmt;

/// Marker trait for the two wire encodings a metadata value can use: plain
/// ascii, or base64-encoded binary (keys ending in `-bin`).
///
/// This is sealed outside the crate — `Ascii` and `Binary` are the only
/// implementers, and they exist purely to parameterize
/// [`MetadataKey`](super::MetadataKey)/[`MetadataValue`](super::MetadataValue)
/// at compile time so the two kinds of metadata can't be mixed up.
pub trait ValueEncoding: self::sealed::Sealed + Clone + Eq + PartialEq {
    #[doc(hidden)]
    fn is_empty(value: &[u8]) -> bool {
        value.is_empty()
    }

    #[doc(hidden)]
    fn from_bytes(value: &[u8]) -> Result<(), ()>;

    #[doc(hidden)]
    fn is_valid_key(key: &str) -> bool;

    #[doc(hidden)]
    fn is_valid_value(value: &[u8]) -> bool;

    #[doc(hidden)]
    fn decode(value: &[u8]) -> Result<Vec<u8>, base64::DecodeError>;

    #[doc(hidden)]
    fn encode(value: &[u8]) -> Vec<u8>;

    #[doc(hidden)]
    fn fmt(value: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Ascii {}
    impl Sealed for super::Binary {}
}

/// A value encoded as ascii text (the default, used by any metadata key that
/// doesn't end in `-bin`).
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Ascii {}

/// A value encoded as base64 binary (used by any metadata key ending in
/// `-bin`).
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Binary {}

impl ValueEncoding for Ascii {
    fn from_bytes(value: &[u8]) -> Result<(), ()> {
        if value.is_ascii() {
            Ok(())
        } else {
            Err(())
        }
    }

    fn is_valid_key(key: &str) -> bool {
        !key.ends_with("-bin")
    }

    fn is_valid_value(value: &[u8]) -> bool {
        value.is_ascii()
    }

    fn decode(value: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
        Ok(value.to_vec())
    }

    fn encode(value: &[u8]) -> Vec<u8> {
        value.to_vec()
    }

    fn fmt(value: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(value) {
            Ok(s) => write!(f, "{s:?}"),
            Err(_) => write!(f, "{value:?}"),
        }
    }
}

impl ValueEncoding for Binary {
    fn from_bytes(value: &[u8]) -> Result<(), ()> {
        decode_base64(value).map(|_| ()).map_err(|_| ())
    }

    fn is_valid_key(key: &str) -> bool {
        key.ends_with("-bin")
    }

    fn is_valid_value(_value: &[u8]) -> bool {
        true
    }

    fn decode(value: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
        decode_base64(value)
    }

    fn encode(value: &[u8]) -> Vec<u8> {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD_NO_PAD
            .encode(value)
            .into_bytes()
    }

    fn fmt(value: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"")?;
        for byte in value.iter().take(64) {
            write!(f, "{byte:02x}")?;
        }
        if value.len() > 64 {
            write!(f, "...")?;
        }
        write!(f, "\"")
    }
}

/// Decode base64, tolerating both the padded and unpadded alphabets — the
/// wire may contain either depending on which peer produced it.
fn decode_base64(value: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(value)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(value))
}
