//! Server-side RPC dispatch and routing: [`Grpc`] drives a single inbound
//! call through a handler implementing one of the streaming-kind traits
//! below — the mirror image of [`crate::client::Grpc`] on the inbound
//! side. [`Router`] dispatches an inbound request to the right service by
//! its `:path`, and [`Server`] accepts the HTTP/2 connections that requests
//! arrive on in the first place.

mod grpc;
mod router;
mod service;
mod transport;

pub use self::grpc::Grpc;
pub use self::router::Router;
pub use self::service::{
    ClientStreamingService, NamedService, ServerStreamingService, StreamingService, UnaryService,
};
pub use self::transport::Server;
