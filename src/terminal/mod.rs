//! Terminal view: the emulator, its session, and their lifecycle.
//!
//! Owns one [`VtEmulator`] and at most one live session. Keystrokes and
//! pastes flow emulator-side-in, session-out; inbound frames flow through
//! the emulator where the grid-view side channel is stripped before
//! rendering. Resize keeps the remote shell's window size in sync with the
//! local grid.

pub mod emulator;

use std::collections::VecDeque;
use std::sync::mpsc as sync_mpsc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::BridgeError;
use crate::gridview::{self, GridData};
use crate::protocol;
use crate::transport::{self, SessionEvent, SessionHandle};
use emulator::VtEmulator;

/// Delay between the session opening and injection of the initial command.
/// The remote shell needs to reach an interactive prompt first; sending
/// immediately risks the command being swallowed by startup banners.
pub const AUTORUN_SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Configuration for one terminal view.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ViewConfig {
    /// HTTP(S) origin of the hosting page; upgraded to ws(s) for the
    /// terminal endpoint.
    pub origin: String,
    pub cols: usize,
    pub rows: usize,
    /// Command pasted into the shell once the session has settled.
    pub initial_command: Option<String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8000".to_string(),
            cols: 80,
            rows: 24,
            initial_command: None,
        }
    }
}

/// Event published to the host UI.
#[derive(Clone, Debug, PartialEq)]
pub enum TerminalEvent {
    /// Raw bytes already fed to the emulator; side-channel sequences have
    /// been stripped from the visible screen state.
    Text(Vec<u8>),
    /// A decoded grid-view payload for the data viewer. Each new payload
    /// replaces the previously displayed one.
    Grid(GridData),
    /// The session ended; the view is reusable via `open`.
    SessionEnded,
}

/// A terminal view bound to (at most) one live session.
pub struct TerminalView {
    config: ViewConfig,
    emulator: VtEmulator,
    session: Option<SessionHandle>,
    events: Option<UnboundedReceiver<SessionEvent>>,
    grid_rx: sync_mpsc::Receiver<GridData>,
    pending: VecDeque<TerminalEvent>,
}

impl TerminalView {
    pub fn new(config: ViewConfig) -> Self {
        let mut emulator = VtEmulator::new(config.cols, config.rows);
        let (grid_tx, grid_rx) = sync_mpsc::channel();
        emulator.register_osc_handler(
            gridview::OSC_IDENTIFIER,
            Box::new(move |params| match gridview::decode(params) {
                Some(grid) => {
                    let _ = grid_tx.send(grid);
                    true
                }
                None => false,
            }),
        );
        Self {
            config,
            emulator,
            session: None,
            events: None,
            grid_rx,
            pending: VecDeque::new(),
        }
    }

    /// Open a session to the terminal endpoint.
    ///
    /// At most one session is active per view: a prior session is closed
    /// before the new socket opens. On success the connected banner is
    /// rendered, the initial resize is sent, and any configured initial
    /// command is pasted after a settle delay.
    pub async fn open(&mut self) -> Result<(), BridgeError> {
        if let Some(mut prior) = self.session.take() {
            log::info!("closing prior session before reopening");
            self.events = None;
            prior.close();
        }

        let url = protocol::ws_url(&self.config.origin)?;
        let (handle, events) = transport::connect(&url).await?;
        self.attach(handle, events);
        self.on_opened();

        if let Some(command) = self.config.initial_command.clone() {
            tokio::time::sleep(AUTORUN_SETTLE_DELAY).await;
            self.paste(&command);
        }
        Ok(())
    }

    fn attach(&mut self, handle: SessionHandle, events: UnboundedReceiver<SessionEvent>) {
        self.session = Some(handle);
        self.events = Some(events);
    }

    /// Post-open sequence: connected banner, then exactly one resize
    /// reflecting current emulator dimensions.
    fn on_opened(&mut self) {
        self.render(protocol::CONNECTED_BANNER.as_bytes());
        let (cols, rows) = wire_dims(self.emulator.cols(), self.emulator.rows());
        if let Some(session) = &self.session {
            session.resize(cols, rows);
        }
    }

    /// Forward keystroke bytes verbatim, preserving dispatch order.
    pub fn input(&mut self, bytes: &[u8]) {
        match &self.session {
            Some(session) => session.send_bytes(bytes),
            None => log::warn!("dropping {} input bytes: no session", bytes.len()),
        }
    }

    /// Inject text as if the user pasted it. Text without a trailing line
    /// terminator gets a carriage return appended so it executes instead
    /// of sitting unsent in the shell's input buffer.
    pub fn paste(&mut self, text: &str) {
        let payload = if text.ends_with('\n') || text.ends_with('\r') {
            text.to_string()
        } else {
            format!("{text}\r")
        };
        match &self.session {
            Some(session) => session.send_text(&payload),
            None => log::warn!("dropping paste: no session"),
        }
    }

    /// Fit the emulator to new dimensions and, if a session is open, send
    /// exactly one resize notification.
    pub fn fit(&mut self, cols: usize, rows: usize) {
        self.emulator.resize(cols, rows);
        if let Some(session) = &self.session {
            if session.is_open() {
                let (cols, rows) = wire_dims(cols, rows);
                session.resize(cols, rows);
            }
        }
    }

    /// Next event for the host UI, or `None` once the view is detached.
    pub async fn next_event(&mut self) -> Option<TerminalEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let events = self.events.as_mut()?;
            match events.recv().await {
                Some(SessionEvent::Frame(bytes)) => {
                    self.emulator.process(&bytes);
                    self.pending.push_back(TerminalEvent::Text(bytes));
                    while let Ok(grid) = self.grid_rx.try_recv() {
                        self.pending.push_back(TerminalEvent::Grid(grid));
                    }
                }
                Some(SessionEvent::Error(message)) => {
                    log::error!("terminal session error: {message}");
                    self.render(protocol::ERROR_BANNER.as_bytes());
                }
                Some(SessionEvent::Closed) | None => {
                    self.render(protocol::CLOSED_BANNER.as_bytes());
                    self.session = None;
                    self.events = None;
                    self.pending.push_back(TerminalEvent::SessionEnded);
                }
            }
        }
    }

    /// Tear down the view's session. Ordering matters: the event receiver
    /// is detached first so nothing fires against the closing session,
    /// then the socket close is issued; the emulator lives until the view
    /// itself drops.
    pub fn close(&mut self) {
        self.events = None;
        self.pending.clear();
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_open())
    }

    /// Rendered screen state, for hosts that mirror the grid.
    pub fn emulator(&self) -> &VtEmulator {
        &self.emulator
    }

    fn render(&mut self, bytes: &[u8]) {
        self.emulator.process(bytes);
        self.pending.push_back(TerminalEvent::Text(bytes.to_vec()));
    }
}

/// Saturate emulator dimensions into the wire format's u16 range.
fn wire_dims(cols: usize, rows: usize) -> (u16, u16) {
    (
        u16::try_from(cols).unwrap_or(u16::MAX),
        u16::try_from(rows).unwrap_or(u16::MAX),
    )
}

impl Drop for TerminalView {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::OutboundFrame;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn attached_view() -> (
        TerminalView,
        mpsc::UnboundedReceiver<OutboundFrame>,
        mpsc::UnboundedSender<SessionEvent>,
    ) {
        let mut view = TerminalView::new(ViewConfig::default());
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut handle = SessionHandle::new(out_tx);
        handle.mark_open();
        view.attach(handle, event_rx);
        (view, out_rx, event_tx)
    }

    #[test]
    fn test_open_sends_resize_once() {
        let (mut view, mut out_rx, _event_tx) = attached_view();
        view.on_opened();
        assert_eq!(
            out_rx.try_recv().unwrap(),
            OutboundFrame::Text("resize:80:24".into())
        );
        assert!(out_rx.try_recv().is_err());
    }

    #[test]
    fn test_open_renders_connected_banner() {
        let (mut view, _out_rx, _event_tx) = attached_view();
        view.on_opened();
        assert!(view.emulator().line_text(1).contains("Connected to PowerShell Terminal"));
    }

    #[test]
    fn test_paste_appends_carriage_return() {
        let (mut view, mut out_rx, _event_tx) = attached_view();
        view.paste("Get-Date");
        assert_eq!(
            out_rx.try_recv().unwrap(),
            OutboundFrame::Text("Get-Date\r".into())
        );
    }

    #[test]
    fn test_paste_keeps_existing_terminator() {
        let (mut view, mut out_rx, _event_tx) = attached_view();
        view.paste("Get-Date\n");
        assert_eq!(
            out_rx.try_recv().unwrap(),
            OutboundFrame::Text("Get-Date\n".into())
        );
    }

    #[test]
    fn test_input_order_preserved() {
        let (mut view, mut out_rx, _event_tx) = attached_view();
        view.input(b"l");
        view.input(b"s");
        view.paste("Get-Date");
        assert_eq!(out_rx.try_recv().unwrap(), OutboundFrame::Binary(b"l".to_vec()));
        assert_eq!(out_rx.try_recv().unwrap(), OutboundFrame::Binary(b"s".to_vec()));
        assert_eq!(
            out_rx.try_recv().unwrap(),
            OutboundFrame::Text("Get-Date\r".into())
        );
        assert!(out_rx.try_recv().is_err());
    }

    #[test]
    fn test_fit_sends_resize_only_while_open() {
        let (mut view, mut out_rx, _event_tx) = attached_view();
        view.fit(120, 40);
        assert_eq!(
            out_rx.try_recv().unwrap(),
            OutboundFrame::Text("resize:120:40".into())
        );

        view.close();
        assert_eq!(out_rx.try_recv().unwrap(), OutboundFrame::Close);
        view.fit(100, 30);
        assert!(out_rx.try_recv().is_err());
    }

    #[test]
    fn test_fit_saturates_oversized_dimensions() {
        let (mut view, mut out_rx, _event_tx) = attached_view();
        view.fit(70_000, 30);
        assert_eq!(
            out_rx.try_recv().unwrap(),
            OutboundFrame::Text("resize:65535:30".into())
        );
    }

    #[test]
    fn test_no_sends_after_close() {
        let (mut view, mut out_rx, _event_tx) = attached_view();
        view.close();
        assert_eq!(out_rx.try_recv().unwrap(), OutboundFrame::Close);

        view.input(b"x");
        view.paste("Get-Date");
        assert!(out_rx.try_recv().is_err());
        assert!(!view.is_open());
    }

    #[tokio::test]
    async fn test_frame_emits_text_then_grid() {
        let (mut view, _out_rx, event_tx) = attached_view();
        let payload = BASE64.encode(r#"{"Name":"A","Status":"OK"}"#);
        let frame = format!("output\x1b]1337;WebGridView;{payload}\x07");
        event_tx
            .send(SessionEvent::Frame(frame.clone().into_bytes()))
            .unwrap();
        drop(event_tx);

        assert_eq!(
            view.next_event().await,
            Some(TerminalEvent::Text(frame.into_bytes()))
        );
        match view.next_event().await {
            Some(TerminalEvent::Grid(grid)) => {
                assert_eq!(grid.rows, vec![json!({"Name":"A","Status":"OK"})]);
                assert_eq!(grid.title, "Out-WebGridView");
            }
            other => panic!("expected grid event, got {other:?}"),
        }
        // Channel gone: closed banner, then session end, then detached.
        assert_eq!(
            view.next_event().await,
            Some(TerminalEvent::Text(
                crate::protocol::CLOSED_BANNER.as_bytes().to_vec()
            ))
        );
        assert_eq!(view.next_event().await, Some(TerminalEvent::SessionEnded));
        assert_eq!(view.next_event().await, None);
    }

    #[tokio::test]
    async fn test_malformed_side_channel_publishes_nothing() {
        let (mut view, _out_rx, event_tx) = attached_view();
        let frame = b"\x1b]1337;WebGridView;!!bad-base64!!\x07".to_vec();
        event_tx.send(SessionEvent::Frame(frame.clone())).unwrap();
        drop(event_tx);

        assert_eq!(view.next_event().await, Some(TerminalEvent::Text(frame)));
        // No grid event: straight to teardown.
        assert_eq!(
            view.next_event().await,
            Some(TerminalEvent::Text(
                crate::protocol::CLOSED_BANNER.as_bytes().to_vec()
            ))
        );
        assert_eq!(view.next_event().await, Some(TerminalEvent::SessionEnded));
    }

    #[tokio::test]
    async fn test_error_renders_banner() {
        let (mut view, _out_rx, event_tx) = attached_view();
        event_tx
            .send(SessionEvent::Error("connection reset".into()))
            .unwrap();
        event_tx.send(SessionEvent::Closed).unwrap();

        assert_eq!(
            view.next_event().await,
            Some(TerminalEvent::Text(
                crate::protocol::ERROR_BANNER.as_bytes().to_vec()
            ))
        );
        assert_eq!(
            view.next_event().await,
            Some(TerminalEvent::Text(
                crate::protocol::CLOSED_BANNER.as_bytes().to_vec()
            ))
        );
        assert_eq!(view.next_event().await, Some(TerminalEvent::SessionEnded));
    }

    #[tokio::test]
    async fn test_open_against_live_endpoint_autoruns() {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::protocol::Message;

        // Peer that records everything it receives.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut tx, mut rx) = ws.split();
            while let Some(Ok(message)) = rx.next().await {
                match message {
                    Message::Text(text) => {
                        let _ = seen_tx.send(text.to_string());
                    }
                    Message::Binary(bytes) => {
                        let _ = seen_tx.send(String::from_utf8_lossy(&bytes).into_owned());
                    }
                    Message::Close(_) => {
                        let _ = tx.send(Message::Close(None)).await;
                        break;
                    }
                    _ => {}
                }
            }
        });

        let mut view = TerminalView::new(ViewConfig {
            origin: format!("http://{addr}"),
            initial_command: Some("Get-Date".to_string()),
            ..ViewConfig::default()
        });
        view.open().await.unwrap();

        assert_eq!(seen_rx.recv().await.unwrap(), "resize:80:24");
        assert_eq!(seen_rx.recv().await.unwrap(), "Get-Date\r");
        view.close();
    }
}
