//! The per-call state machine: one side (local or remote) of a gRPC call,
//! tracked independently of the `Streaming<T>`/`EncodeBody<S>` machinery
//! that does the actual byte shuffling.
//!
//! `Streaming`/`EncodeBody` already enforce the wire-level framing and
//! half-close discipline; `CallState` sits a layer above them and enforces
//! the arity rules spec'd per [`StreamingType`] (exactly one request for
//! `NonStreaming`/`ServerStreaming`, exactly one response for
//! `NonStreaming`/`ClientStreaming`) plus the "nothing after terminal"
//! invariant, independent of whatever transport is underneath — useful for
//! callers (interceptors, test doubles) that want to drive a call without
//! going through an actual HTTP/2 connection.

use crate::codec::StreamingType;
use crate::status::{Code, Status};

/// One side (send or receive direction) of a call's lifecycle.
///
/// ```text
/// Init -> HeadersSent -> Sending <-> Recving -> Closed(terminal)
///                      \-> HalfClosedLocal -\     /
///                      /-> HalfClosedRemote -\-> Closed
/// ```
///
/// `Sending`/`Recving`/`HalfClosed{Local,Remote}` aren't mutually exclusive
/// in the diagram above — a bidirectional call's two directions progress
/// independently — so in practice `CallState` tracks local and remote
/// progress as two separate fields rather than one combined enum; see
/// [`CallState::local`]/[`CallState::remote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing has been sent or received yet.
    Init,
    /// Headers have gone out (or come in), but no message yet.
    HeadersSent,
    /// Actively sending/receiving messages.
    Active,
    /// This side has sent/received its terminal element; the other side
    /// may still be active (relevant only for `BiDiStreaming`).
    HalfClosed,
}

/// How many elements have crossed one direction of a call so far, tracked
/// so [`CallState`] can enforce `StreamingType`'s arity rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ElementCount(u32);

impl ElementCount {
    fn increment(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// The error a misused `CallState` operation reports — the
/// "precondition"/"protocol violated" cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStateError {
    /// `send`/`recv` was attempted outside the phase that permits it.
    FailedPrecondition,
    /// The peer (or caller) violated the streaming arity/finality contract.
    ProtocolViolation,
    /// An operation was attempted on a call that is already `Closed`.
    AlreadyClosed,
}

impl CallStateError {
    /// The gRPC code this error maps to.
    #[must_use]
    pub fn code(self) -> Code {
        match self {
            Self::FailedPrecondition => Code::FailedPrecondition,
            Self::ProtocolViolation => Code::Unknown,
            Self::AlreadyClosed => Code::FailedPrecondition,
        }
    }
}

impl From<CallStateError> for Status {
    fn from(err: CallStateError) -> Self {
        let message = match err {
            CallStateError::FailedPrecondition => {
                "send/recv attempted outside the phase that permits it"
            }
            CallStateError::ProtocolViolation => "streaming arity or finality contract violated",
            CallStateError::AlreadyClosed => "operation attempted on a closed call",
        };
        Status::new(err.code(), message)
    }
}

/// The full per-call state machine: local send-direction phase, remote
/// receive-direction phase, and the element counts needed to enforce
/// [`StreamingType`]'s arity rules, plus the terminal status once the call
/// has closed.
#[derive(Debug, Clone)]
pub struct CallState {
    streaming: StreamingType,
    local: Phase,
    remote: Phase,
    sent: ElementCount,
    received: ElementCount,
    terminal: Option<Status>,
}

impl CallState {
    /// Creates a new call state machine for a call of the given streaming
    /// kind, not yet past `Init` on either side.
    #[must_use]
    pub fn new(streaming: StreamingType) -> Self {
        Self {
            streaming,
            local: Phase::Init,
            remote: Phase::Init,
            sent: ElementCount::default(),
            received: ElementCount::default(),
            terminal: None,
        }
    }

    /// This call's streaming kind.
    #[must_use]
    pub fn streaming_type(&self) -> StreamingType {
        self.streaming
    }

    /// The local (send) direction's current phase.
    #[must_use]
    pub fn local(&self) -> Phase {
        self.local
    }

    /// The remote (receive) direction's current phase.
    #[must_use]
    pub fn remote(&self) -> Phase {
        self.remote
    }

    /// Whether this call has reached its terminal `Closed` state.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.terminal.is_some()
    }

    /// The status this call closed with, once it has.
    #[must_use]
    pub fn terminal_status(&self) -> Option<&Status> {
        self.terminal.as_ref()
    }

    /// Records headers having gone out locally — `Init -> HeadersSent`.
    pub fn headers_sent(&mut self) -> Result<(), CallStateError> {
        self.require_open()?;
        if self.local != Phase::Init {
            return Err(CallStateError::FailedPrecondition);
        }
        self.local = Phase::HeadersSent;
        Ok(())
    }

    /// Records headers having arrived from the peer — `Init -> HeadersSent`
    /// on the remote side.
    pub fn headers_received(&mut self) -> Result<(), CallStateError> {
        self.require_open()?;
        if self.remote != Phase::Init {
            return Err(CallStateError::FailedPrecondition);
        }
        self.remote = Phase::HeadersSent;
        Ok(())
    }

    /// Records sending a non-final element. Precondition: local is
    /// `HeadersSent` or `Active`. For `NonStreaming`/`ServerStreaming`, a
    /// second send is a protocol violation (at most one request message
    /// permitted).
    pub fn send_elem(&mut self) -> Result<(), CallStateError> {
        self.require_open()?;
        self.require_local_sendable()?;
        self.sent = self.sent.increment();
        if !self.streaming.client_streams() && self.sent.0 > 1 {
            return Err(CallStateError::ProtocolViolation);
        }
        self.local = Phase::Active;
        Ok(())
    }

    /// Records sending the final element (or a bare end-of-stream with no
    /// accompanying element) — local transitions to `HalfClosed`.
    pub fn send_final(&mut self, carries_element: bool) -> Result<(), CallStateError> {
        self.require_open()?;
        self.require_local_sendable()?;
        if carries_element {
            self.sent = self.sent.increment();
        }
        if !self.streaming.client_streams() && self.sent.0 > 1 {
            return Err(CallStateError::ProtocolViolation);
        }
        self.local = Phase::HalfClosed;
        self.maybe_close();
        Ok(())
    }

    /// Records receiving a non-final element from the peer. Precondition:
    /// remote is `HeadersSent` or `Active`.
    pub fn recv_elem(&mut self) -> Result<(), CallStateError> {
        self.require_open()?;
        self.require_remote_recvable()?;
        self.received = self.received.increment();
        if !self.streaming.server_streams() && self.received.0 > 1 {
            return Err(CallStateError::ProtocolViolation);
        }
        self.remote = Phase::Active;
        Ok(())
    }

    /// Records receiving the final element (or `NoMoreElems` with no
    /// accompanying element) from the peer — remote transitions to
    /// `HalfClosed`, and checks the "exactly one response" arity rule for
    /// `NonStreaming`/`ClientStreaming` calls.
    pub fn recv_final(&mut self, carried_element: bool) -> Result<(), CallStateError> {
        self.require_open()?;
        self.require_remote_recvable()?;
        if carried_element {
            self.received = self.received.increment();
        }
        if !self.streaming.server_streams() {
            if self.received.0 == 0 {
                return Err(CallStateError::ProtocolViolation);
            }
            if self.received.0 > 1 {
                return Err(CallStateError::ProtocolViolation);
            }
        }
        self.remote = Phase::HalfClosed;
        self.maybe_close();
        Ok(())
    }

    /// Cancels the call: both sides transition to `Closed` immediately,
    /// regardless of their current phase, with `status` (conventionally
    /// [`Code::Cancelled`]) as the terminal status.
    pub fn cancel(&mut self, status: Status) {
        self.local = Phase::HalfClosed;
        self.remote = Phase::HalfClosed;
        self.terminal.get_or_insert(status);
    }

    /// Forces the call terminal with the given status without requiring
    /// both directions to have half-closed first — used when a protocol
    /// violation or transport failure ends the call early.
    pub fn fail(&mut self, status: Status) {
        self.terminal.get_or_insert(status);
    }

    fn maybe_close(&mut self) {
        if self.local == Phase::HalfClosed && self.remote == Phase::HalfClosed {
            self.terminal.get_or_insert_with(|| Status::ok(""));
        }
    }

    fn require_open(&self) -> Result<(), CallStateError> {
        if self.is_closed() {
            return Err(CallStateError::AlreadyClosed);
        }
        Ok(())
    }

    fn require_local_sendable(&self) -> Result<(), CallStateError> {
        match self.local {
            Phase::HeadersSent | Phase::Active => Ok(()),
            Phase::Init | Phase::HalfClosed => Err(CallStateError::FailedPrecondition),
        }
    }

    fn require_remote_recvable(&self) -> Result<(), CallStateError> {
        match self.remote {
            Phase::HeadersSent | Phase::Active => Ok(()),
            Phase::Init | Phase::HalfClosed => Err(CallStateError::FailedPrecondition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unary_happy_path_closes_on_mutual_half_close() {
        let mut state = CallState::new(StreamingType::NonStreaming);
        state.headers_sent().unwrap();
        state.headers_received().unwrap();
        state.send_final(true).unwrap();
        assert!(!state.is_closed());
        state.recv_final(true).unwrap();
        assert!(state.is_closed());
        assert_eq!(state.terminal_status().unwrap().code(), Code::Ok);
    }

    #[test]
    fn unary_rejects_a_second_response() {
        let mut state = CallState::new(StreamingType::NonStreaming);
        state.headers_sent().unwrap();
        state.headers_received().unwrap();
        state.recv_elem().unwrap();
        let err = state.recv_elem().unwrap_err();
        assert_eq!(err, CallStateError::ProtocolViolation);
    }

    #[test]
    fn unary_rejects_zero_responses() {
        let mut state = CallState::new(StreamingType::NonStreaming);
        state.headers_sent().unwrap();
        state.headers_received().unwrap();
        let err = state.recv_final(false).unwrap_err();
        assert_eq!(err, CallStateError::ProtocolViolation);
    }

    #[test]
    fn server_streaming_permits_many_responses() {
        let mut state = CallState::new(StreamingType::ServerStreaming);
        state.headers_sent().unwrap();
        state.headers_received().unwrap();
        state.send_final(true).unwrap();
        state.recv_elem().unwrap();
        state.recv_elem().unwrap();
        state.recv_final(true).unwrap();
        assert!(state.is_closed());
    }

    #[test]
    fn nothing_succeeds_after_closed() {
        let mut state = CallState::new(StreamingType::BiDiStreaming);
        state.cancel(Status::cancelled("client cancelled"));
        assert!(state.is_closed());
        assert_eq!(
            state.send_elem().unwrap_err(),
            CallStateError::AlreadyClosed
        );
        assert_eq!(
            state.recv_elem().unwrap_err(),
            CallStateError::AlreadyClosed
        );
    }

    #[test]
    fn send_before_headers_is_failed_precondition() {
        let mut state = CallState::new(StreamingType::BiDiStreaming);
        let err = state.send_elem().unwrap_err();
        assert_eq!(err, CallStateError::FailedPrecondition);
    }

    #[test]
    fn bidi_directions_close_independently() {
        let mut state = CallState::new(StreamingType::BiDiStreaming);
        state.headers_sent().unwrap();
        state.headers_received().unwrap();
        state.send_final(true).unwrap();
        assert!(!state.is_closed(), "only one side half-closed so far");
        state.recv_elem().unwrap();
        state.recv_final(true).unwrap();
        assert!(state.is_closed());
    }

    #[test]
    fn cancel_status_wins_over_later_ok_close() {
        let mut state = CallState::new(StreamingType::BiDiStreaming);
        state.cancel(Status::cancelled("gone"));
        assert_eq!(state.terminal_status().unwrap().code(), Code::Cancelled);
    }
}
