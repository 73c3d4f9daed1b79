//! Client-side session transport.
//!
//! A session is one live duplex connection to the remote shell. The owning
//! view holds a [`SessionHandle`] for outbound traffic and drains a
//! [`SessionEvent`] receiver for inbound traffic; both sides of the wire
//! are serialized through channels so ordering matches dispatch order.

pub mod session;

pub use session::connect;

use tokio::sync::mpsc::UnboundedSender;

use crate::protocol;

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// Inbound event delivered to the session owner, in receipt order.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Raw bytes from the remote shell, to be fed to the emulator.
    Frame(Vec<u8>),
    /// The socket reported an error. A `Closed` event follows.
    Error(String),
    /// The socket is gone; no further events will arrive.
    Closed,
}

/// Outbound frame queued for the socket writer.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Outbound half of a session.
///
/// Sends while the session is not open are dropped with a warning rather
/// than surfaced as errors: they indicate a programming-level race, not a
/// user-facing condition.
pub struct SessionHandle {
    tx: UnboundedSender<OutboundFrame>,
    state: SessionState,
}

impl SessionHandle {
    pub(crate) fn new(tx: UnboundedSender<OutboundFrame>) -> Self {
        Self {
            tx,
            state: SessionState::Connecting,
        }
    }

    pub(crate) fn mark_open(&mut self) {
        self.state = SessionState::Open;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Forward a text frame verbatim.
    pub fn send_text(&self, text: &str) {
        if !self.is_open() {
            log::warn!(
                "dropping {} bytes: session is {:?}",
                text.len(),
                self.state
            );
            return;
        }
        let _ = self.tx.send(OutboundFrame::Text(text.to_string()));
    }

    /// Forward raw bytes verbatim.
    pub fn send_bytes(&self, bytes: &[u8]) {
        if !self.is_open() {
            log::warn!(
                "dropping {} bytes: session is {:?}",
                bytes.len(),
                self.state
            );
            return;
        }
        let _ = self.tx.send(OutboundFrame::Binary(bytes.to_vec()));
    }

    /// Notify the remote shell of new terminal dimensions.
    pub fn resize(&self, cols: u16, rows: u16) {
        log::debug!("sending resize {cols}x{rows}");
        self.send_text(&protocol::resize_message(cols, rows));
    }

    /// Request socket close. Idempotent; all subsequent sends are no-ops.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        let _ = self.tx.send(OutboundFrame::Close);
    }
}
