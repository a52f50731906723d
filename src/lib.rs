//! `grpc-core`: a gRPC runtime over HTTP/2.
//!
//! This crate implements the gRPC wire protocol — length-prefixed framing,
//! header/trailer assembly, streaming call discipline, compression
//! negotiation, and status-code propagation — on both the client and server
//! sides. It does not implement HTTP/2 itself (that's [`h2`]/[`hyper`]) or
//! any particular message format (that's a `Codec` supplied by the caller,
//! e.g. a `tonic-build`-style generated client).
//!
//! The pieces:
//!
//! - [`status`] — the `Code`/`Status` error model.
//! - [`metadata`] — custom header/trailer metadata.
//! - [`codec`] — message framing, compression, and the `Codec` seam.
//! - [`call`] — the per-call streaming state machine and [`call::StreamElem`].
//! - [`request`]/[`response`] — the `Request<T>`/`Response<T>` wrappers.
//! - [`client`] — the client-side call dispatcher, [`client::Grpc`].
//! - [`transport`] (feature `channel`) — a managed connection to one peer.
//! - [`server`] (feature `server`) — routing and driving inbound calls.

#![warn(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod body;
pub mod call;
pub mod client;
pub mod codec;
pub mod metadata;
pub mod request;
pub mod response;
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;
pub mod status;
#[cfg(any(feature = "server", feature = "channel"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "server", feature = "channel"))))]
pub mod transport;

pub use body::Body;
pub use request::{IntoRequest, IntoStreamingRequest, Request};
pub use response::Response;
pub use status::{Code, ConnectError, Status, TimeoutExpired};

/// The catch-all error type for anything below the gRPC status layer: a
/// transport failure, a connect error, an I/O error. [`Status::from_error`]
/// is how one of these becomes wire-visible.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The `user-agent` value this crate sends when a caller hasn't set one.
pub(crate) const DEFAULT_USER_AGENT: &str = concat!("grpc-core/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    #[test]
    fn default_user_agent_is_nonempty() {
        assert!(!super::DEFAULT_USER_AGENT.is_empty());
    }
}
