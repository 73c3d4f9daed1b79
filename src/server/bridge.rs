//! WebSocket-to-PTY bridging for one terminal session.

use std::time::Duration;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::pty::PtyProcess;
use super::BridgeConfig;
use crate::protocol;

/// Cadence for draining the non-blocking PTY master.
const PTY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Serve one terminal session over an accepted TCP connection.
///
/// The websocket upgrade is only honored on the terminal endpoint path.
/// The shell runs sandboxed in a per-session temp dir which also replaces
/// `HOME`, isolating modules and profile state; the dir is removed on
/// teardown.
pub async fn serve(stream: TcpStream, config: BridgeConfig) -> anyhow::Result<()> {
    let websocket = accept_hdr_async(stream, |request: &Request, response: Response| {
        if request.uri().path() == protocol::TERMINAL_ENDPOINT {
            Ok(response)
        } else {
            log::warn!("rejecting websocket upgrade on {}", request.uri().path());
            let mut rejection = ErrorResponse::new(Some("not found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    })
    .await
    .context("websocket handshake failed")?;

    let sandbox = tempfile::Builder::new()
        .prefix("webterm_session_")
        .tempdir()
        .context("failed to create session dir")?;
    log::info!("created session dir: {}", sandbox.path().display());

    let env = vec![
        ("TERM".to_string(), config.term.clone()),
        ("LANG".to_string(), "en_US.UTF-8".to_string()),
        ("HOME".to_string(), sandbox.path().to_string_lossy().into_owned()),
    ];
    let mut pty = PtyProcess::spawn(
        config.cols,
        config.rows,
        &config.program,
        &config.args,
        sandbox.path(),
        &env,
    )
    .context("failed to start shell")?;
    log::info!("terminal session started, pid {}", pty.child_pid());

    let (mut ws_write, mut ws_read) = websocket.split();
    let mut poll = tokio::time::interval(PTY_POLL_INTERVAL);

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        // A resize: prefix always marks a control frame;
                        // a malformed one is dropped, never shell input.
                        if text.starts_with("resize:") {
                            match protocol::parse_resize(&text) {
                                Some((cols, rows)) => {
                                    if let Err(e) = pty.resize(cols, rows) {
                                        log::warn!("resize failed: {e}");
                                    }
                                }
                                None => {
                                    log::warn!("dropping malformed resize frame: {text:?}");
                                }
                            }
                        } else if let Err(e) = pty.write(text.as_bytes()) {
                            log::warn!("pty write failed: {e}");
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if let Err(e) = pty.write(&bytes) {
                            log::warn!("pty write failed: {e}");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("websocket error: {e}");
                        break;
                    }
                }
            }
            _ = poll.tick() => {
                match pty.read() {
                    Ok(output) if !output.is_empty() => {
                        let text = String::from_utf8_lossy(&output).into_owned();
                        if ws_write.send(Message::text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {
                        if pty.try_wait().is_some() {
                            log::info!("shell exited, ending session");
                            break;
                        }
                    }
                    // EIO here means the child side of the PTY is gone.
                    Err(e) => {
                        log::info!("pty read ended: {e}");
                        break;
                    }
                }
            }
        }
    }

    // Flush whatever the shell produced before teardown.
    if let Ok(trailing) = pty.read() {
        if !trailing.is_empty() {
            let text = String::from_utf8_lossy(&trailing).into_owned();
            let _ = ws_write.send(Message::text(text)).await;
        }
    }
    let _ = ws_write.send(Message::Close(None)).await;
    log::info!("cleaning up terminal session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{self, SessionEvent};
    use tokio::net::TcpListener;

    fn sh_config(addr: std::net::SocketAddr) -> BridgeConfig {
        BridgeConfig {
            bind_addr: addr,
            program: "/bin/sh".to_string(),
            args: Vec::new(),
            term: "dumb".to_string(),
            ..BridgeConfig::default()
        }
    }

    async fn spawn_bridge() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = serve(stream, sh_config(addr)).await;
        });
        addr
    }

    async fn collect_output(
        events: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
        needle: &str,
    ) -> String {
        let mut collected = String::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let event = tokio::time::timeout_at(deadline, events.recv())
                .await
                .expect("timed out waiting for shell output");
            match event {
                Some(SessionEvent::Frame(bytes)) => {
                    collected.push_str(&String::from_utf8_lossy(&bytes));
                    if collected.contains(needle) {
                        return collected;
                    }
                }
                Some(SessionEvent::Error(e)) => panic!("session error: {e}"),
                Some(SessionEvent::Closed) | None => {
                    panic!("session closed before output arrived: {collected:?}")
                }
            }
        }
    }

    #[tokio::test]
    async fn test_end_to_end_shell_round_trip() {
        let addr = spawn_bridge().await;
        let url = format!("ws://{addr}/ws/terminal");
        let (handle, mut events) = transport::connect(&url).await.unwrap();

        handle.send_text("echo bridge-ok\n");
        let output = collect_output(&mut events, "bridge-ok").await;
        assert!(output.contains("bridge-ok"));

        handle.send_text("resize:120:40");
        handle.send_text("exit\n");
        loop {
            match events.recv().await {
                Some(SessionEvent::Closed) | None => break,
                Some(_) => {}
            }
        }
    }

    #[tokio::test]
    async fn test_malformed_resize_never_reaches_shell() {
        let addr = spawn_bridge().await;
        let url = format!("ws://{addr}/ws/terminal");
        let (handle, mut events) = transport::connect(&url).await.unwrap();

        // Malformed control frames must be dropped, not typed into the
        // shell, or they would prefix the next command line.
        handle.send_text("resize:120");
        handle.send_text("resize:0:24");
        handle.send_text("echo marker-ok\n");
        let output = collect_output(&mut events, "marker-ok").await;
        assert!(output.contains("marker-ok"));
        assert!(!output.contains("resize:"));

        handle.send_text("exit\n");
        loop {
            match events.recv().await {
                Some(SessionEvent::Closed) | None => break,
                Some(_) => {}
            }
        }
    }

    #[tokio::test]
    async fn test_wrong_path_is_rejected() {
        let addr = spawn_bridge().await;
        let url = format!("ws://{addr}/ws/other");
        assert!(transport::connect(&url).await.is_err());
    }
}
