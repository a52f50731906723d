//! HTTP/2 transport plumbing: a managed client connection ([`channel`],
//! feature `channel`) and an inbound call acceptor ([`server` at the crate
//! root], feature `server`). Both sides share the `grpc-timeout` middleware
//! in [`service`].

#[cfg(any(feature = "server", feature = "channel"))]
pub(crate) mod service;

#[cfg(feature = "channel")]
#[cfg_attr(docsrs, doc(cfg(feature = "channel")))]
mod channel;

#[cfg(feature = "channel")]
pub use self::channel::{Channel, Endpoint};
