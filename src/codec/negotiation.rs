//! Connection-level compression negotiation: the one-shot
//! selection of an algorithm for the lifetime of a connection, layered on
//! top of the per-message `grpc-encoding`/`grpc-accept-encoding` header
//! handling in [`super::compression`].
//!
//! [`super::compression`] negotiates purely per-message: every
//! request/response pair carries its own `grpc-encoding`/`grpc-accept-encoding`
//! headers and the receiving side just honors whatever the sender claims.
//! This module adds the stronger guarantee a connection often wants — a
//! `Negotiation` fixes the *connection's* outbound algorithm once, from the
//! peer's first response, rather than leaving every call to renegotiate
//! independently.

use super::compression::CompressionEncoding;
use std::fmt;

/// The peer-advertised encodings a [`Negotiation`] strategy chooses from —
/// parsed out of a `grpc-accept-encoding` header, in the order the peer
/// listed them.
pub type PeerSupported = Vec<CompressionEncoding>;

/// Why compression negotiation failed: none of our offered encodings were
/// in the peer's advertised set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionNegotiationFailed {
    /// The peer's advertised `grpc-accept-encoding` set, as parsed.
    pub peer_offer: PeerSupported,
}

impl fmt::Display for CompressionNegotiationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "compression negotiation failed: peer supports {:?}, none of which we offer",
            self.peer_offer
        )
    }
}

impl std::error::Error for CompressionNegotiationFailed {}

/// A strategy for picking a single compression algorithm out of a peer's
/// advertised support, fixed once per connection.
///
/// `identity` is always implicitly acceptable for decoding regardless of
/// strategy — these three variants govern only what gets chosen for
/// *outbound* compression.
#[derive(Debug, Clone)]
pub enum Negotiation {
    /// Never compress outbound messages; advertise only `identity`.
    None,
    /// Insist on one specific algorithm; fail negotiation if the peer
    /// doesn't support it.
    Require(CompressionEncoding),
    /// Advertise `offer`, in order, and pick the first entry the peer also
    /// supports. Falls back to `identity` if nothing overlaps — this
    /// variant never fails negotiation (unlike `Require`).
    ChooseFirst(Vec<CompressionEncoding>),
}

impl Negotiation {
    /// The non-empty, ordered list of encodings this strategy advertises in
    /// `grpc-accept-encoding`. Empty for [`Negotiation::None`] (meaning:
    /// advertise only the implicit `identity`).
    #[must_use]
    pub fn offer(&self) -> Vec<CompressionEncoding> {
        match self {
            Self::None => Vec::new(),
            Self::Require(encoding) => vec![*encoding],
            Self::ChooseFirst(order) => order.clone(),
        }
    }

    /// Runs negotiation against the peer's advertised support, returning
    /// the chosen outbound algorithm (`None` meaning identity) or the
    /// reason negotiation failed.
    pub fn choose(
        &self,
        peer_supported: &PeerSupported,
    ) -> Result<Option<CompressionEncoding>, CompressionNegotiationFailed> {
        match self {
            Self::None => Ok(None),
            Self::Require(encoding) => {
                if peer_supported.contains(encoding) {
                    Ok(Some(*encoding))
                } else {
                    Err(CompressionNegotiationFailed {
                        peer_offer: peer_supported.clone(),
                    })
                }
            }
            Self::ChooseFirst(order) => {
                Ok(order.iter().find(|e| peer_supported.contains(e)).copied())
            }
        }
    }

    /// Parses a `grpc-accept-encoding` header value into the ordered list
    /// of encodings this crate recognizes (unrecognized tokens, including
    /// vendor-specific ones we can't compress/decompress ourselves, are
    /// silently skipped — we can only ever choose among `supported`).
    #[must_use]
    pub fn parse_peer_offer(header_value: &str) -> PeerSupported {
        header_value
            .split(',')
            .filter_map(|tok| match tok.trim() {
                "gzip" => Some(CompressionEncoding::Gzip),
                "deflate" => Some(CompressionEncoding::Deflate),
                "zstd" => Some(CompressionEncoding::Zstd),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_compresses() {
        let negotiation = Negotiation::None;
        assert!(negotiation.offer().is_empty());
        assert_eq!(
            negotiation
                .choose(&vec![CompressionEncoding::Gzip])
                .unwrap(),
            None
        );
    }

    #[test]
    fn require_fails_when_peer_lacks_support() {
        let negotiation = Negotiation::Require(CompressionEncoding::Zstd);
        let err = negotiation
            .choose(&vec![CompressionEncoding::Gzip])
            .unwrap_err();
        assert_eq!(err.peer_offer, vec![CompressionEncoding::Gzip]);
    }

    #[test]
    fn choose_first_picks_our_preferred_order() {
        let negotiation = Negotiation::ChooseFirst(vec![
            CompressionEncoding::Zstd,
            CompressionEncoding::Gzip,
        ]);
        let chosen = negotiation
            .choose(&vec![CompressionEncoding::Gzip, CompressionEncoding::Deflate])
            .unwrap();
        assert_eq!(chosen, Some(CompressionEncoding::Gzip));
    }

    #[test]
    fn choose_first_falls_back_to_identity_without_overlap() {
        let negotiation = Negotiation::ChooseFirst(vec![CompressionEncoding::Zstd]);
        let chosen = negotiation
            .choose(&vec![CompressionEncoding::Gzip])
            .unwrap();
        assert_eq!(chosen, None);
    }

    #[test]
    fn parse_peer_offer_skips_unknown_tokens() {
        let parsed = Negotiation::parse_peer_offer("gzip, brotli ,identity, zstd");
        assert_eq!(
            parsed,
            vec![CompressionEncoding::Gzip, CompressionEncoding::Zstd]
        );
    }
}
