//! Wire protocol shared by the client session and the server bridge.
//!
//! The terminal channel carries raw bytes in both directions with one
//! in-band control frame: a resize notification in the literal form
//! `resize:<cols>:<rows>`.

/// Well-known endpoint path for the terminal websocket.
pub const TERMINAL_ENDPOINT: &str = "/ws/terminal";

/// Banner rendered into the terminal when the session opens.
pub const CONNECTED_BANNER: &str = "\r\n\x1b[32mConnected to PowerShell Terminal\x1b[0m\r\n";

/// Banner rendered when the session ends.
pub const CLOSED_BANNER: &str = "\r\n\x1b[31mConnection closed.\x1b[0m\r\n";

/// Banner rendered on a socket error.
pub const ERROR_BANNER: &str = "\r\n\x1b[31mWebSocket Error.\x1b[0m\r\n";

/// Derive the terminal websocket URL from an HTTP(S) origin.
///
/// The scheme is upgraded to its streaming equivalent (`http`→`ws`,
/// `https`→`wss`), a trailing slash is trimmed, and the well-known
/// endpoint path is appended. Origins already in ws/wss form pass through.
pub fn ws_url(origin: &str) -> Result<String, crate::BridgeError> {
    let base = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if origin.starts_with("ws://") || origin.starts_with("wss://") {
        origin.to_string()
    } else {
        return Err(crate::BridgeError::InvalidOrigin(origin.to_string()));
    };
    Ok(format!("{}{}", base.trim_end_matches('/'), TERMINAL_ENDPOINT))
}

/// Format a resize control frame.
pub fn resize_message(cols: u16, rows: u16) -> String {
    format!("resize:{cols}:{rows}")
}

/// Parse a resize control frame.
///
/// Accepts exactly `resize:<cols>:<rows>` with both fields positive
/// integers; anything else is rejected. A `resize:`-prefixed frame that
/// fails to parse is a malformed control frame and must be dropped by the
/// caller, never forwarded to the shell as input.
pub fn parse_resize(message: &str) -> Option<(u16, u16)> {
    let rest = message.strip_prefix("resize:")?;
    let mut parts = rest.split(':');
    let cols: u16 = parts.next()?.parse().ok()?;
    let rows: u16 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || cols == 0 || rows == 0 {
        return None;
    }
    Some((cols, rows))
}
