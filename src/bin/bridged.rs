//! Standalone terminal bridge daemon serving `/ws/terminal`.
//!
//! Environment:
//! - `WEBTERM_BIND`: listen address (default `127.0.0.1:8000`)
//! - `WEBTERM_SHELL`: shell program (default `pwsh`, with -NoLogo -NoProfile)

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use tokio::net::TcpListener;
    use webterm_core::server::{bridge, BridgeConfig};

    env_logger::init();

    let mut config = BridgeConfig::default();
    if let Ok(addr) = std::env::var("WEBTERM_BIND") {
        config.bind_addr = addr.parse().context("invalid WEBTERM_BIND")?;
    }
    if let Ok(shell) = std::env::var("WEBTERM_SHELL") {
        config.program = shell;
        config.args = Vec::new();
    }

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    log::info!("terminal bridge listening on {}", config.bind_addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        log::info!("connection from {peer}");
        let session_config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge::serve(stream, session_config).await {
                log::error!("session from {peer} failed: {e:#}");
            }
        });
    }
}

#[cfg(not(unix))]
fn main() {
    eprintln!("webterm-bridged requires a unix host (PTY support)");
    std::process::exit(1);
}
