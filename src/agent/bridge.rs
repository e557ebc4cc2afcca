//! Agent process bridge
//!
//! Owns the helper process and the listening side of its data channel. The
//! channel is accepted at most once; the terminal program is started inside
//! the helper when that happens.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::host::{AgentHandle, AgentHost, Launch};
use crate::pty::{SpawnRequest, Transport, TransportEvent};
use crate::session::EventKind;

static CHANNELS: AtomicU64 = AtomicU64::new(0);

/// Data channel events re-emitted on the session
pub const FORWARDED_EVENTS: [(&str, EventKind); 5] = [
    ("connect", EventKind::Connect),
    ("data", EventKind::Data),
    ("end", EventKind::End),
    ("timeout", EventKind::Timeout),
    ("drain", EventKind::Drain),
];

/// Session event kind a data channel event is re-emitted as, if any
pub fn forwarded_kind(event: &TransportEvent) -> Option<EventKind> {
    let name = event.name();
    FORWARDED_EVENTS
        .iter()
        .find(|(forwarded, _)| *forwarded == name)
        .map(|(_, kind)| *kind)
}

/// A fresh data channel name, unique within this process
pub fn channel_name() -> String {
    let n = CHANNELS.fetch_add(1, Ordering::SeqCst) + 1;
    format!(
        r"\\.\pipe\partty-data-{}-{}",
        n,
        Utc::now().timestamp_millis()
    )
}

/// One helper process and its pending data channel
#[derive(Debug)]
pub struct AgentBridge {
    channel: String,
    pid: u32,
    accept: Option<oneshot::Receiver<Transport>>,
    launch: Option<Launch>,
}

impl AgentBridge {
    /// Listen on a new channel, then start the helper pointed at it
    pub fn start(host: &dyn AgentHost, request: &SpawnRequest) -> io::Result<(Self, AgentHandle)> {
        let channel = channel_name();
        let accept = host.listen(&channel)?;
        let handle = host.open(&channel, request.size, request.debug)?;

        info!(
            "Agent {} ({}) waiting on {}",
            handle.pid, handle.pty_id, channel
        );

        let bridge = Self {
            channel,
            pid: handle.pid,
            accept: Some(accept),
            launch: Some(Launch::from_request(request)),
        };
        Ok((bridge, handle))
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the data channel.
    ///
    /// Resolves once with the connection, then never again. Safe to cancel.
    pub async fn accepted(&mut self) -> Option<Transport> {
        let pending = self.accept.as_mut()?;
        let transport = pending.await.ok();
        self.accept = None;
        if transport.is_none() {
            debug!("Channel {} closed without a connection", self.channel);
        }
        transport
    }

    /// Start the terminal program for the accepted channel.
    ///
    /// Returns false if it was already started.
    pub fn on_accepted(&mut self, host: &dyn AgentHost) -> io::Result<bool> {
        let Some(launch) = self.launch.take() else {
            return Ok(false);
        };
        info!(
            "Starting `{}` in agent {}",
            launch.command_line(),
            self.pid
        );
        host.start_process(self.pid, &launch)?;
        Ok(true)
    }
}
