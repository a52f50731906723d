use std::{borrow::Cow, fmt};

use bytes::{Buf, BufMut, BytesMut};

use crate::{metadata::MetadataValue, status::Status};

pub(crate) const ENCODING_HEADER: &str = "grpc-encoding";
pub(crate) const ACCEPT_ENCODING_HEADER: &str = "grpc-accept-encoding";

/// Which compression encodings are enabled on a server or client channel.
///
/// An ordered, fixed-capacity set (three slots — one per encoding this crate
/// knows about); `identity` is never stored explicitly, it's simply what
/// "nothing else negotiated" means.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnabledCompressionEncodings {
    inner: [Option<CompressionEncoding>; 3],
}

impl EnabledCompressionEncodings {
    /// Enables `encoding`, appending it to the end of the list if it isn't
    /// already present.
    pub fn enable(&mut self, encoding: CompressionEncoding) {
        for e in self.inner.iter_mut() {
            match e {
                Some(e) if *e == encoding => return,
                None => {
                    *e = Some(encoding);
                    return;
                }
                _ => (),
            }
        }
    }

    /// Removes and returns the last enabled encoding.
    pub fn pop(&mut self) -> Option<CompressionEncoding> {
        self.inner.iter_mut().rev().find(|entry| entry.is_some())?.take()
    }

    pub(crate) fn try_into_accept_encoding_header_value(
        self,
    ) -> Result<Option<http::HeaderValue>, crate::BoxError> {
        let mut value = BytesMut::new();
        for encoding in self.inner.into_iter().flatten() {
            value.put_slice(encoding.as_str().as_bytes());
            value.put_u8(b',');
        }

        if value.is_empty() {
            return Ok(None);
        }

        value.put_slice(b"identity");
        Ok(Some(http::HeaderValue::from_maybe_shared(
            value.freeze(),
        )?))
    }

    /// Like [`Self::try_into_accept_encoding_header_value`], but swallows
    /// the (practically unreachable — the only inputs are `as_str()`
    /// outputs plus `,`/`identity`, all valid header bytes) encoding error,
    /// for call sites that just want "no header" on failure.
    pub(crate) fn into_accept_encoding_header_value(self) -> Option<http::HeaderValue> {
        self.try_into_accept_encoding_header_value().ok().flatten()
    }

    /// Returns `true` if `encoding` is enabled.
    #[must_use]
    pub fn is_enabled(&self, encoding: CompressionEncoding) -> bool {
        self.inner.contains(&Some(encoding))
    }

    /// Returns `true` if no encoding is enabled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.iter().all(Option::is_none)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CompressionSettings {
    pub(crate) encoding: CompressionEncoding,
    /// Buffer growth granularity: keeps resize frequency and memory waste in
    /// balance. The default is 8 KiB.
    pub(crate) buffer_growth_interval: usize,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            encoding: CompressionEncoding::Gzip,
            buffer_growth_interval: 8 * 1024,
        }
    }
}

/// The compression algorithms this crate can encode/decode itself, once the
/// matching Cargo feature (`gzip`, `deflate`, `zstd`) is enabled.
///
/// `identity` (no compression) has no variant here — it's represented as
/// `Option<CompressionEncoding>::None` throughout the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompressionEncoding {
    Gzip,
    Deflate,
    Zstd,
}

impl CompressionEncoding {
    pub(crate) const ENCODINGS: &'static [Self] = &[Self::Gzip, Self::Deflate, Self::Zstd];

    /// Picks an encoding to use for a response, based on the peer's
    /// `grpc-accept-encoding` header and what's enabled locally.
    pub(crate) fn from_accept_encoding_header(
        map: &http::HeaderMap,
        enabled_encodings: EnabledCompressionEncodings,
    ) -> Option<Self> {
        if enabled_encodings.is_empty() {
            return None;
        }

        let header_value = map.get(ACCEPT_ENCODING_HEADER)?;
        let header_value_str = header_value.to_str().ok()?;

        split_by_comma(header_value_str).find_map(|value| {
            let candidate = match value {
                "gzip" => Self::Gzip,
                "deflate" => Self::Deflate,
                "zstd" => Self::Zstd,
                _ => return None,
            };
            enabled_encodings.is_enabled(candidate).then_some(candidate)
        })
    }

    /// Reads the `grpc-encoding` header, rejecting it with
    /// [`Code::Unimplemented`](crate::status::Code::Unimplemented) if the
    /// algorithm isn't enabled locally.
    pub(crate) fn from_encoding_header(
        map: &http::HeaderMap,
        enabled_encodings: EnabledCompressionEncodings,
    ) -> Result<Option<Self>, Status> {
        let Some(header_value) = map.get(ENCODING_HEADER) else {
            return Ok(None);
        };

        match header_value.as_bytes() {
            b"gzip" if enabled_encodings.is_enabled(Self::Gzip) => Ok(Some(Self::Gzip)),
            b"deflate" if enabled_encodings.is_enabled(Self::Deflate) => Ok(Some(Self::Deflate)),
            b"zstd" if enabled_encodings.is_enabled(Self::Zstd) => Ok(Some(Self::Zstd)),
            b"identity" => Ok(None),
            other => {
                let other = match std::str::from_utf8(other) {
                    Ok(s) => Cow::Borrowed(s),
                    Err(_) => Cow::Owned(format!("{other:?}")),
                };

                let mut status = Status::unimplemented(format!(
                    "Content is compressed with `{other}` which isn't supported"
                ));

                let header_value = enabled_encodings
                    .try_into_accept_encoding_header_value()
                    .map_err(|e| Status::internal(e.to_string()))?
                    .map(MetadataValue::unchecked_from_header_value)
                    .unwrap_or_else(|| MetadataValue::from_static("identity"));
                status.metadata_mut().insert(ACCEPT_ENCODING_HEADER, header_value);

                Err(status)
            }
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Zstd => "zstd",
        }
    }

    pub(crate) fn into_header_value(self) -> http::HeaderValue {
        http::HeaderValue::from_static(self.as_str())
    }
}

impl fmt::Display for CompressionEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn split_by_comma(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim)
}

/// Compresses `len` bytes from the front of `decompressed_buf` into
/// `out_buf`, advancing past the consumed bytes.
pub(crate) fn compress(
    settings: CompressionSettings,
    decompressed_buf: &mut BytesMut,
    out_buf: &mut BytesMut,
    len: usize,
) -> Result<(), std::io::Error> {
    let capacity =
        ((len / settings.buffer_growth_interval) + 1) * settings.buffer_growth_interval;
    out_buf.reserve(capacity);

    let mut out_writer = (&mut *out_buf).writer();

    match settings.encoding {
        #[cfg(feature = "gzip")]
        CompressionEncoding::Gzip => {
            let mut encoder = flate2::read::GzEncoder::new(
                &decompressed_buf[0..len],
                flate2::Compression::new(6),
            );
            std::io::copy(&mut encoder, &mut out_writer)?;
        }
        #[cfg(not(feature = "gzip"))]
        CompressionEncoding::Gzip => return Err(unsupported_encoding("gzip")),
        #[cfg(feature = "deflate")]
        CompressionEncoding::Deflate => {
            let mut encoder = flate2::read::ZlibEncoder::new(
                &decompressed_buf[0..len],
                flate2::Compression::new(6),
            );
            std::io::copy(&mut encoder, &mut out_writer)?;
        }
        #[cfg(not(feature = "deflate"))]
        CompressionEncoding::Deflate => return Err(unsupported_encoding("deflate")),
        #[cfg(feature = "zstd")]
        CompressionEncoding::Zstd => {
            let mut encoder = zstd::stream::read::Encoder::new(
                &decompressed_buf[0..len],
                zstd::DEFAULT_COMPRESSION_LEVEL,
            )?;
            std::io::copy(&mut encoder, &mut out_writer)?;
        }
        #[cfg(not(feature = "zstd"))]
        CompressionEncoding::Zstd => return Err(unsupported_encoding("zstd")),
    }

    decompressed_buf.advance(len);
    Ok(())
}

/// Decompresses `len` bytes from the front of `compressed_buf` into
/// `out_buf`, advancing past the consumed bytes.
pub(crate) fn decompress(
    settings: CompressionSettings,
    compressed_buf: &mut BytesMut,
    out_buf: &mut BytesMut,
    len: usize,
) -> Result<(), std::io::Error> {
    let estimate_decompressed_len = len * 2;
    let capacity = ((estimate_decompressed_len / settings.buffer_growth_interval) + 1)
        * settings.buffer_growth_interval;
    out_buf.reserve(capacity);

    let mut out_writer = (&mut *out_buf).writer();

    match settings.encoding {
        #[cfg(feature = "gzip")]
        CompressionEncoding::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(&compressed_buf[0..len]);
            std::io::copy(&mut decoder, &mut out_writer)?;
        }
        #[cfg(not(feature = "gzip"))]
        CompressionEncoding::Gzip => return Err(unsupported_encoding("gzip")),
        #[cfg(feature = "deflate")]
        CompressionEncoding::Deflate => {
            let mut decoder = flate2::read::ZlibDecoder::new(&compressed_buf[0..len]);
            std::io::copy(&mut decoder, &mut out_writer)?;
        }
        #[cfg(not(feature = "deflate"))]
        CompressionEncoding::Deflate => return Err(unsupported_encoding("deflate")),
        #[cfg(feature = "zstd")]
        CompressionEncoding::Zstd => {
            let mut decoder = zstd::stream::read::Decoder::new(&compressed_buf[0..len])?;
            std::io::copy(&mut decoder, &mut out_writer)?;
        }
        #[cfg(not(feature = "zstd"))]
        CompressionEncoding::Zstd => return Err(unsupported_encoding("zstd")),
    }

    compressed_buf.advance(len);
    Ok(())
}

#[allow(dead_code)]
fn unsupported_encoding(name: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("`{name}` compression requested but its Cargo feature is disabled"),
    )
}

/// Controls compression behavior for an individual message within a stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SingleMessageCompressionOverride {
    /// Inherit whatever compression is configured for the stream.
    #[default]
    Inherit,
    /// Don't compress this message, even if the stream is compressed.
    Disable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn convert_none_into_header_value() {
        let encodings = EnabledCompressionEncodings::default();
        assert!(encodings.try_into_accept_encoding_header_value().unwrap().is_none());
    }

    #[test]
    fn convert_gzip_into_header_value() {
        let mut encodings = EnabledCompressionEncodings::default();
        encodings.enable(CompressionEncoding::Gzip);

        assert_eq!(
            encodings.try_into_accept_encoding_header_value().unwrap().unwrap(),
            HeaderValue::from_static("gzip,identity"),
        );
    }

    #[test]
    fn convert_all_three_into_header_value() {
        let mut encodings = EnabledCompressionEncodings::default();
        encodings.enable(CompressionEncoding::Gzip);
        encodings.enable(CompressionEncoding::Deflate);
        encodings.enable(CompressionEncoding::Zstd);

        assert_eq!(
            encodings.try_into_accept_encoding_header_value().unwrap().unwrap(),
            HeaderValue::from_static("gzip,deflate,zstd,identity"),
        );
    }

    #[test]
    fn enable_is_idempotent() {
        let mut encodings = EnabledCompressionEncodings::default();
        encodings.enable(CompressionEncoding::Gzip);
        encodings.enable(CompressionEncoding::Gzip);
        assert_eq!(encodings.pop(), Some(CompressionEncoding::Gzip));
        assert_eq!(encodings.pop(), None);
    }

    #[test]
    fn unsupported_encoding_header_produces_unimplemented_with_accept_list() {
        let mut enabled = EnabledCompressionEncodings::default();
        enabled.enable(CompressionEncoding::Gzip);

        let mut headers = http::HeaderMap::new();
        headers.insert(ENCODING_HEADER, HeaderValue::from_static("brotli"));

        let err = CompressionEncoding::from_encoding_header(&headers, enabled).unwrap_err();
        assert_eq!(err.code(), crate::status::Code::Unimplemented);
        assert!(err.metadata().get(ACCEPT_ENCODING_HEADER).is_some());
    }
}
