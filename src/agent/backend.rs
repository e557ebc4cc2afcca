//! Agent backend: a helper process owns the pty and talks over a data channel
//!
//! Nothing can be written or resized until the helper has produced its first
//! output, so every mutating operation goes through a [`ReadinessGate`].

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::bridge::{forwarded_kind, AgentBridge};
use super::host::AgentHost;
use crate::pty::{
    classify, BackendProfile, ErrorClass, PtyError, PtyResult, SpawnRequest, TerminalSize,
    Transport, TransportEvent,
};
use crate::session::{
    Backend, BackendEvent, Identity, ReadinessGate, Sealed, SessionEvent, SessionState,
};

/// What deferred operations act on
struct AgentLink {
    host: Arc<dyn AgentHost>,
    pid: u32,
    channel: Option<Transport>,
}

impl AgentLink {
    fn channel(&mut self) -> PtyResult<&mut Transport> {
        self.channel.as_mut().ok_or(PtyError::NotConnected)
    }

    fn terminate(&mut self, state: &mut SessionState) -> PtyResult<()> {
        state.close();
        self.host.kill(self.pid).map_err(PtyError::KillFailed)
    }
}

/// Backend driving a helper process
pub struct Agent {
    bridge: AgentBridge,
    link: AgentLink,
    gate: ReadinessGate<AgentLink, SessionState>,
    destroyed: bool,
}

impl Agent {
    fn defer<F>(&mut self, state: &mut SessionState, op: F) -> PtyResult<()>
    where
        F: FnOnce(&mut AgentLink, &mut SessionState) -> PtyResult<()> + Send + 'static,
    {
        self.gate.defer(&mut self.link, state, op).map(|_| ())
    }

    fn accept(&mut self, state: &mut SessionState, channel: Transport) -> PtyResult<()> {
        if self.link.channel.is_some() {
            warn!("Ignoring second data channel for agent {}", self.link.pid);
            return Ok(());
        }

        info!("Agent {} connected on {}", self.link.pid, self.bridge.channel());
        self.link.channel = Some(channel);
        match self.bridge.on_accepted(&*self.link.host) {
            Ok(_) => Ok(()),
            Err(e) => state.escalate(PtyError::SpawnFailed(e)),
        }
    }

    fn forward(&mut self, state: &mut SessionState, event: TransportEvent) -> PtyResult<()> {
        match event {
            TransportEvent::Data(data) => {
                if !self.gate.is_ready() {
                    info!(
                        "Agent {} ready, replaying {} operations",
                        self.link.pid,
                        self.gate.pending()
                    );
                }
                let mut errors = self.gate.mark_ready(&mut self.link, state).into_iter();
                state.emit(&SessionEvent::Data(&data));
                while let Some(err) = errors.next() {
                    if let Err(err) = state.escalate(err) {
                        for rest in errors {
                            warn!("Agent {} replay also failed: {}", self.link.pid, rest);
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
            TransportEvent::Error(e) => {
                state.close();
                if classify(&e) == ErrorClass::Hangup {
                    debug!("Agent {} hung up: {}", self.link.pid, e);
                    return Ok(());
                }
                state.escalate(PtyError::Transport(e))
            }
            TransportEvent::Close => {
                state.emit_exit();
                state.close();
                state.finish();
                Ok(())
            }
            other => {
                if let Some(event) = forwarded_kind(&other).and_then(SessionEvent::signal) {
                    state.emit(&event);
                }
                Ok(())
            }
        }
    }
}

impl Sealed for Agent {}

impl Backend for Agent {
    type Host = dyn AgentHost;

    const PROFILE: BackendProfile = BackendProfile {
        default_file: "cmd.exe",
        default_name: "Windows Shell",
        default_size: TerminalSize::new(80, 30),
        sanitize_inherited_env: false,
    };

    fn spawn(host: Arc<dyn AgentHost>, request: SpawnRequest) -> PtyResult<(Self, Identity)> {
        let (bridge, handle) =
            AgentBridge::start(&*host, &request).map_err(PtyError::SpawnFailed)?;

        let identity = Identity {
            pid: Some(handle.pid),
            fd: handle.fd,
            pty_id: handle.pty_id,
            file: request.file,
            name: request.name,
            size: request.size,
        };

        let backend = Self {
            bridge,
            link: AgentLink {
                host,
                pid: handle.pid,
                channel: None,
            },
            gate: ReadinessGate::new(),
            destroyed: false,
        };
        Ok((backend, identity))
    }

    fn open(_host: Arc<dyn AgentHost>, _size: TerminalSize) -> PtyResult<(Self, Identity)> {
        Err(PtyError::Unsupported("open()"))
    }

    fn write(&mut self, state: &mut SessionState, data: &[u8]) -> PtyResult<()> {
        let data = data.to_vec();
        self.defer(state, move |link, state| {
            if !state.is_writable() {
                return Ok(());
            }
            link.channel()?.write(&data).map_err(PtyError::Transport)
        })
    }

    fn end(&mut self, state: &mut SessionState, data: Option<&[u8]>) -> PtyResult<()> {
        let data = data.map(<[u8]>::to_vec);
        self.defer(state, move |link, state| {
            if !state.is_writable() {
                return Ok(());
            }
            link.channel()?
                .end(data.as_deref())
                .map_err(PtyError::Transport)
        })
    }

    fn resize(&mut self, state: &mut SessionState, cols: i64, rows: i64) -> PtyResult<()> {
        self.defer(state, move |link, state| {
            let size = TerminalSize::normalize(cols, rows, state.size(), Self::PROFILE.default_size);
            state.set_size(size);
            link.host
                .resize(link.pid, size)
                .map_err(PtyError::ResizeFailed)
        })
    }

    fn kill(&mut self, state: &mut SessionState, signal: Option<&str>) -> PtyResult<()> {
        if signal.is_some() {
            return Err(PtyError::SignalsUnsupported);
        }
        self.defer(state, AgentLink::terminate)
    }

    fn destroy(&mut self, state: &mut SessionState) -> PtyResult<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.kill(state, None)
    }

    fn process_name(&self, state: &SessionState) -> String {
        state.file().to_string()
    }

    fn next_event(&mut self) -> impl Future<Output = Option<BackendEvent>> + Send {
        async move {
            if let Some(channel) = self.link.channel.as_mut() {
                return channel.recv().await.map(BackendEvent::Transport);
            }
            self.bridge.accepted().await.map(BackendEvent::Accepted)
        }
    }

    fn dispatch(&mut self, state: &mut SessionState, event: BackendEvent) -> PtyResult<()> {
        match event {
            BackendEvent::Accepted(channel) => self.accept(state, channel),
            BackendEvent::Transport(event) => self.forward(state, event),
        }
    }
}
