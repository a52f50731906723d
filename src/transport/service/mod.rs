//! Small `tower` middleware shared by both the client and server transport
//! stacks.

mod grpc_timeout;

pub(crate) use self::grpc_timeout::GrpcTimeout;
