/// Errors raised while establishing or serving a terminal bridge.
///
/// Failures on a live session never surface here: per the propagation
/// policy they are rendered as terminal banners or logged, so a broken
/// session cannot take the hosting application down with it.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// WebSocket handshake or connection setup failed.
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    /// The origin string could not be turned into a ws/wss URL.
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),
}
