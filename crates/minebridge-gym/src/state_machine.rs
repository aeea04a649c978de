//! Request/reply alternation enforced on the transport.
//!
//! The external client speaks first: after a bind the only legal operation
//! is `recv`. From then on `send` and `recv` strictly alternate.
//!
//! ```text
//! Closed --bind--> AwaitingRequest --recv--> ReplyPending --send--> AwaitingRequest
//!                       any state --close--> Closed
//! ```

use minebridge_core::error::TransportError;

/// Transport exchange state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Not bound.
    Closed,
    /// Bound; waiting for the next message from the client.
    AwaitingRequest,
    /// A message was received; a reply must be sent next.
    ReplyPending,
}

impl ExchangeState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::AwaitingRequest => "awaiting_request",
            Self::ReplyPending => "reply_pending",
        }
    }
}

/// Operation attempted on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Recv,
    Send,
}

impl Exchange {
    const fn name(self) -> &'static str {
        match self {
            Self::Recv => "recv",
            Self::Send => "send",
        }
    }
}

/// Tracks exchange state and rejects out-of-order operations.
///
/// # Example
///
/// ```
/// use minebridge_gym::state_machine::{Exchange, ExchangeState, ExchangeStateMachine};
///
/// let mut sm = ExchangeStateMachine::new();
/// sm.on_bind();
/// assert!(sm.check(Exchange::Send).is_err());
/// sm.check(Exchange::Recv).unwrap();
/// sm.complete(Exchange::Recv);
/// assert_eq!(sm.state(), ExchangeState::ReplyPending);
/// ```
#[derive(Debug)]
pub struct ExchangeStateMachine {
    state: ExchangeState,
}

impl ExchangeStateMachine {
    /// Create a new state machine in the [`Closed`](ExchangeState::Closed) state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ExchangeState::Closed,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ExchangeState {
        self.state
    }

    pub const fn on_bind(&mut self) {
        self.state = ExchangeState::AwaitingRequest;
    }

    pub const fn on_close(&mut self) {
        self.state = ExchangeState::Closed;
    }

    /// Validate that `op` is legal now without changing state.
    ///
    /// # Errors
    ///
    /// [`TransportError::OutOfOrder`] when `op` is not allowed.
    pub fn check(&self, op: Exchange) -> Result<(), TransportError> {
        match (self.state, op) {
            (ExchangeState::AwaitingRequest, Exchange::Recv)
            | (ExchangeState::ReplyPending, Exchange::Send) => Ok(()),
            _ => Err(TransportError::OutOfOrder {
                state: self.state.name(),
                attempted: op.name(),
            }),
        }
    }

    /// Record that `op` completed. Call only after a successful [`check`](Self::check).
    pub const fn complete(&mut self, op: Exchange) {
        self.state = match op {
            Exchange::Recv => ExchangeState::ReplyPending,
            Exchange::Send => ExchangeState::AwaitingRequest,
        };
    }
}

impl Default for ExchangeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
