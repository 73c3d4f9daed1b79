//! Server half of the terminal bridge: the `/ws/terminal` endpoint backed
//! by a PTY-hosted shell process.

pub mod bridge;
pub mod pty;

use std::net::SocketAddr;

/// Configuration for the bridge endpoint.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BridgeConfig {
    pub bind_addr: SocketAddr,
    /// Shell program spawned per session.
    pub program: String,
    pub args: Vec<String>,
    /// TERM value exported to the shell.
    pub term: String,
    /// Initial PTY dimensions; clients follow up with resize frames.
    pub cols: u16,
    pub rows: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            program: "pwsh".to_string(),
            args: vec!["-NoLogo".to_string(), "-NoProfile".to_string()],
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
        }
    }
}
