//! webterm-core — engine for a browser-hosted PowerShell console
//!
//! Provides the interactive terminal bridge: a WebSocket session to a remote
//! shell, VT emulation of its output, the grid-view escape-sequence side
//! channel, and the server endpoint that backs it all with a PTY.

pub mod error;
pub mod gridview;
pub mod protocol;
#[cfg(unix)]
pub mod server;
pub mod terminal;
pub mod transport;

pub use error::BridgeError;
pub use gridview::GridData;
pub use terminal::{TerminalEvent, TerminalView, ViewConfig};
pub use transport::{SessionEvent, SessionState};
