//! WebSocket session establishment and I/O pumping.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use super::{OutboundFrame, SessionEvent, SessionHandle};
use crate::error::BridgeError;

/// Open a session to the terminal endpoint.
///
/// On success the handle is already open: the handshake has completed and
/// frames may be sent immediately. A writer task drains the outbound
/// channel and a reader task translates inbound frames into
/// [`SessionEvent`]s, ending with a single `Closed`. Errors are reported
/// as events and never retried; reconnection is an explicit user action
/// because keystrokes already sent may have had side effects.
pub async fn connect(
    url: &str,
) -> Result<(SessionHandle, UnboundedReceiver<SessionEvent>), BridgeError> {
    let (ws_stream, _response) = connect_async(url).await?;
    log::info!("terminal session connected: {url}");

    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();

    // Writer: outbound channel -> socket.
    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let message = match frame {
                OutboundFrame::Text(text) => Message::text(text),
                OutboundFrame::Binary(bytes) => Message::binary(bytes),
                OutboundFrame::Close => {
                    let _ = ws_write.send(Message::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = ws_write.send(message).await {
                log::warn!("terminal send failed: {e}");
                break;
            }
        }
    });

    // Reader: socket -> event channel.
    tokio::spawn(async move {
        while let Some(message) = ws_read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let _ = event_tx.send(SessionEvent::Frame(text.as_bytes().to_vec()));
                }
                Ok(Message::Binary(bytes)) => {
                    let _ = event_tx.send(SessionEvent::Frame(bytes.to_vec()));
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {} // ping/pong handled by the protocol layer
                Err(e) => {
                    let _ = event_tx.send(SessionEvent::Error(e.to_string()));
                    break;
                }
            }
        }
        log::info!("terminal session closed");
        let _ = event_tx.send(SessionEvent::Closed);
    });

    let mut handle = SessionHandle::new(out_tx);
    handle.mark_open();
    Ok((handle, event_rx))
}
