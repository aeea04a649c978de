//! The bridge's reply channel.
//!
//! [`Transport`] binds a TCP listener on the instance's env port. The client
//! connects to it and sends the first observation; the bridge then answers
//! each observation with an action. The connection is accepted lazily on the
//! first `recv`, which is the only call that blocks.

use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use minebridge_core::error::TransportError;
use tracing::{debug, info, warn};

use crate::framing::{read_frame, write_frame};
use crate::state_machine::{Exchange, ExchangeState, ExchangeStateMachine};

/// Synchronous reply-role channel with enforced recv/send alternation.
#[derive(Debug, Default)]
pub struct Transport {
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    local_addr: Option<SocketAddr>,
    machine: ExchangeStateMachine,
}

impl Transport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to `addr`, closing any previous binding first.
    ///
    /// Returns the bound address (useful when binding port 0).
    ///
    /// # Errors
    ///
    /// [`TransportError::Bind`] if the address cannot be bound. No other port
    /// is tried.
    pub fn bind(&mut self, addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<SocketAddr, TransportError> {
        self.close();
        let listener = TcpListener::bind(&addr).map_err(|source| TransportError::Bind {
            addr: format!("{addr:?}"),
            source,
        })?;
        let local = listener.local_addr()?;
        info!(addr = %local, "transport bound");
        self.listener = Some(listener);
        self.local_addr = Some(local);
        self.machine.on_bind();
        Ok(local)
    }

    /// Bind on all interfaces at `port`.
    ///
    /// # Errors
    ///
    /// See [`bind`](Self::bind).
    pub fn bind_port(&mut self, port: u16) -> Result<SocketAddr, TransportError> {
        self.bind(("0.0.0.0", port))
    }

    /// Block until the next message arrives.
    ///
    /// Accepts the client connection first if none is established.
    ///
    /// # Errors
    ///
    /// [`TransportError::OutOfOrder`] unless a message is expected now;
    /// [`TransportError::PeerClosed`] if the client disconnects; I/O and
    /// framing errors otherwise.
    pub fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.machine.check(Exchange::Recv)?;
        let stream = self.connection()?;
        match read_frame(stream)? {
            Some(bytes) => {
                debug!(len = bytes.len(), "transport received");
                self.machine.complete(Exchange::Recv);
                Ok(bytes)
            }
            None => {
                warn!("transport peer closed the connection");
                self.stream = None;
                Err(TransportError::PeerClosed)
            }
        }
    }

    /// Send the reply to the last received message.
    ///
    /// # Errors
    ///
    /// [`TransportError::OutOfOrder`] unless a reply is due; I/O errors
    /// otherwise.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.machine.check(Exchange::Send)?;
        let stream = self.stream.as_mut().ok_or(TransportError::PeerClosed)?;
        write_frame(stream, bytes)?;
        debug!(len = bytes.len(), "transport sent");
        self.machine.complete(Exchange::Send);
        Ok(())
    }

    /// Release the connection and the listener. Safe to call repeatedly.
    ///
    /// The listener is released before the connection is shut down, so a
    /// client that sees EOF can no longer reach the old listener.
    pub fn close(&mut self) {
        let had_listener = self.listener.take().is_some();
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if had_listener {
            debug!(addr = ?self.local_addr, "transport closed");
        }
        self.local_addr = None;
        self.machine.on_close();
    }

    #[must_use]
    pub const fn state(&self) -> ExchangeState {
        self.machine.state()
    }

    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.listener.is_some()
    }

    fn connection(&mut self) -> Result<&mut TcpStream, TransportError> {
        if self.stream.is_none() {
            let listener = self.listener.as_ref().ok_or(TransportError::OutOfOrder {
                state: ExchangeState::Closed.name(),
                attempted: "recv",
            })?;
            let (stream, peer) = listener.accept()?;
            stream.set_nodelay(true)?;
            info!(%peer, "transport accepted client");
            self.stream = Some(stream);
        }
        self.stream.as_mut().ok_or(TransportError::PeerClosed)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
