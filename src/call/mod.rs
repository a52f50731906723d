//! The per-call streaming model: [`StreamElem`], the three-valued
//! "is this the final one?" element gRPC's finality ambiguity forces on
//! both sides of a call, and [`CallState`], the state machine that enforces
//! streaming-arity and half-close discipline on top of it.

mod state;
mod stream_elem;

pub use state::{CallState, CallStateError, Phase};
pub use stream_elem::StreamElem;
