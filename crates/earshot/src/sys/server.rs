use crate::events::AppEvent;
use async_channel::Sender;
use sonar::command::Command;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::UnixListener;

pub async fn run_server(socket_path: &Path, tx: Sender<AppEvent>) {
    // Cleanup old socket if it exists
    if std::fs::metadata(socket_path).is_ok() {
        let _ = std::fs::remove_file(socket_path);
    }

    let listener = match UnixListener::bind(socket_path) {
        Ok(l) => l,
        Err(e) => {
            log::error!("Failed to bind unix socket {}: {}", socket_path.display(), e);
            return;
        }
    };
    log::info!("Listening for input on {}", socket_path.display());

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    forward_commands(stream, tx).await;
                });
            }
            Err(e) => {
                log::error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Reads one command per line until the peer hangs up or the app stops
/// listening. Lines that don't parse are logged and skipped.
pub async fn forward_commands<R: AsyncRead + Unpin>(stream: R, tx: Sender<AppEvent>) {
    let mut lines = BufReader::new(stream).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(cmd) => {
                if tx.send(AppEvent::from(cmd)).await.is_err() {
                    break;
                }
            }
            Err(e) => log::warn!("Ignoring control line '{}': {}", line.trim(), e),
        }
    }
}
