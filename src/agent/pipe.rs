//! Named pipe listener for agent data channels

use std::io;

use tokio::net::windows::named_pipe::ServerOptions;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::pty::Transport;

/// Create the pipe `name` and resolve with its first connection.
///
/// Suitable for [`AgentHost::listen`](super::AgentHost::listen). Must be
/// called from within a tokio runtime.
pub fn listen_named_pipe(name: &str) -> io::Result<oneshot::Receiver<Transport>> {
    let server = ServerOptions::new()
        .first_pipe_instance(true)
        .create(name)?;
    let (tx, rx) = oneshot::channel();
    let name = name.to_string();

    tokio::spawn(async move {
        match server.connect().await {
            Ok(()) => {
                debug!("Agent connected on {}", name);
                let _ = tx.send(Transport::from_stream(server));
            }
            Err(e) => warn!("Failed to accept on {}: {}", name, e),
        }
    });

    Ok(rx)
}
