//! Direct backend: the pty is allocated in-process and its fd is usable at once

use std::future::Future;
use std::io;
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::{classify, ErrorClass, PtyError, PtyResult};
use super::options::{BackendProfile, SpawnRequest};
use super::size::TerminalSize;
use super::transport::{Transport, TransportEvent};
use crate::session::{
    Backend, BackendEvent, Identity, Sealed, SessionEvent, SessionState, Terminal,
};

/// Signal sent by `kill` without an argument and after `destroy`
pub const DEFAULT_SIGNAL: &str = "SIGHUP";

/// A child attached to a freshly allocated pty
#[derive(Debug)]
pub struct Allocation {
    pub pid: u32,
    pub fd: i32,
    pub pty_id: String,
    /// Stream over the pty master
    pub transport: Transport,
}

/// Both ends of a pty without a child
#[derive(Debug)]
pub struct PtyPair {
    /// Descriptor of the master end
    pub fd: i32,
    pub pty_id: String,
    pub master: Transport,
    pub slave: Transport,
}

/// Native pty primitives used by the direct backend
pub trait PtyHost: Send + Sync {
    /// Allocate a pty and fork/exec the requested program into it
    fn allocate(&self, request: &SpawnRequest) -> io::Result<Allocation>;

    /// Allocate a pty pair without a child
    fn open_pair(&self, size: TerminalSize) -> io::Result<PtyPair>;

    /// Set the window size of the pty behind `fd`
    fn resize(&self, fd: i32, size: TerminalSize) -> io::Result<()>;

    /// Send `signal` (e.g. `"SIGHUP"`) to `pid`
    fn kill(&self, pid: u32, signal: &str) -> io::Result<()>;

    /// Name of the foreground process on the pty
    fn process_name(&self, fd: i32, pty_id: &str) -> Option<String>;

    /// Forget anything held for `fd`
    fn release(&self, _fd: i32) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Spawned,
    Opened,
}

/// Backend over a pty fd owned by this process
pub struct Direct {
    host: Arc<dyn PtyHost>,
    fd: i32,
    transport: Transport,
    slave: Option<Transport>,
    mode: Mode,
    destroyed: bool,
}

impl Terminal<Direct> {
    /// The session transport (the master end for opened pairs)
    pub fn master(&mut self) -> &mut Transport {
        &mut self.backend_mut().transport
    }

    /// The slave end of an opened pair
    pub fn slave(&mut self) -> Option<&mut Transport> {
        self.backend_mut().slave.as_mut()
    }
}

impl Direct {
    fn hang_up(&mut self, state: &mut SessionState) {
        state.close();
        self.host.release(self.fd);
        state.finish();
    }

    fn dispatch_spawned(&mut self, state: &mut SessionState, event: TransportEvent) -> PtyResult<()> {
        match event {
            TransportEvent::Data(data) => state.emit(&SessionEvent::Data(&data)),
            TransportEvent::Connect => state.emit(&SessionEvent::Connect),
            TransportEvent::End => state.emit(&SessionEvent::End),
            TransportEvent::Timeout => state.emit(&SessionEvent::Timeout),
            TransportEvent::Drain => state.emit(&SessionEvent::Drain),
            TransportEvent::Error(e) => {
                let class = classify(&e);
                if class == ErrorClass::Retry {
                    return Ok(());
                }

                state.close();
                state.emit_exit();

                if class == ErrorClass::Hangup {
                    debug!("Pty {} hung up: {}", state.pty_id(), e);
                    return Ok(());
                }
                return state.escalate(PtyError::Transport(e));
            }
            TransportEvent::Close => {
                state.close();
                state.emit_exit();
                self.hang_up(state);
            }
        }
        Ok(())
    }

    fn dispatch_opened(&mut self, state: &mut SessionState, event: TransportEvent) -> PtyResult<()> {
        match event {
            TransportEvent::Data(data) => state.emit(&SessionEvent::Data(&data)),
            TransportEvent::Connect => state.emit(&SessionEvent::Connect),
            TransportEvent::End => state.emit(&SessionEvent::End),
            TransportEvent::Timeout => state.emit(&SessionEvent::Timeout),
            TransportEvent::Drain => state.emit(&SessionEvent::Drain),
            TransportEvent::Error(e) => {
                state.release();
                state.close();
                return state.escalate(PtyError::Transport(e));
            }
            TransportEvent::Close => {
                state.release();
                self.hang_up(state);
            }
        }
        Ok(())
    }
}

impl Sealed for Direct {}

impl Backend for Direct {
    type Host = dyn PtyHost;

    const PROFILE: BackendProfile = BackendProfile {
        default_file: "sh",
        default_name: "xterm",
        default_size: TerminalSize::new(80, 24),
        sanitize_inherited_env: true,
    };

    fn spawn(host: Arc<dyn PtyHost>, request: SpawnRequest) -> PtyResult<(Self, Identity)> {
        let allocation = host.allocate(&request).map_err(PtyError::SpawnFailed)?;

        let identity = Identity {
            pid: Some(allocation.pid),
            fd: Some(allocation.fd),
            pty_id: allocation.pty_id,
            file: request.file,
            name: request.name,
            size: request.size,
        };

        let backend = Self {
            host,
            fd: allocation.fd,
            transport: allocation.transport,
            slave: None,
            mode: Mode::Spawned,
            destroyed: false,
        };
        Ok((backend, identity))
    }

    fn open(host: Arc<dyn PtyHost>, size: TerminalSize) -> PtyResult<(Self, Identity)> {
        let pair = host.open_pair(size).map_err(PtyError::OpenFailed)?;

        let identity = Identity {
            pid: None,
            fd: Some(pair.fd),
            pty_id: pair.pty_id,
            file: std::env::args()
                .next()
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
            name: std::env::var("TERM").unwrap_or_default(),
            size,
        };

        let backend = Self {
            host,
            fd: pair.fd,
            transport: pair.master,
            slave: Some(pair.slave),
            mode: Mode::Opened,
            destroyed: false,
        };
        Ok((backend, identity))
    }

    fn write(&mut self, state: &mut SessionState, data: &[u8]) -> PtyResult<()> {
        if !state.is_writable() {
            return Ok(());
        }
        self.transport.write(data).map_err(PtyError::Transport)
    }

    fn end(&mut self, state: &mut SessionState, data: Option<&[u8]>) -> PtyResult<()> {
        if !state.is_writable() {
            return Ok(());
        }
        self.transport.end(data).map_err(PtyError::Transport)
    }

    fn resize(&mut self, state: &mut SessionState, cols: i64, rows: i64) -> PtyResult<()> {
        let size = TerminalSize::normalize(cols, rows, state.size(), Self::PROFILE.default_size);
        state.set_size(size);
        // The fd may already belong to another session once this one closed
        if !state.is_readable() {
            return Ok(());
        }
        self.host
            .resize(self.fd, size)
            .map_err(PtyError::ResizeFailed)
    }

    fn kill(&mut self, state: &mut SessionState, signal: Option<&str>) -> PtyResult<()> {
        let Some(pid) = state.pid() else {
            return Ok(());
        };
        let signal = signal.unwrap_or(DEFAULT_SIGNAL);
        if let Err(e) = self.host.kill(pid, signal) {
            debug!("Ignoring failure to send {} to {}: {}", signal, pid, e);
        }
        Ok(())
    }

    fn destroy(&mut self, state: &mut SessionState) -> PtyResult<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;

        state.close();
        self.transport.destroy();
        if let Some(slave) = self.slave.as_mut() {
            slave.destroy();
        }

        match self.mode {
            Mode::Spawned => {
                state.emit_exit();
                self.hang_up(state);
                self.kill(state, Some(DEFAULT_SIGNAL))
            }
            Mode::Opened => {
                state.release();
                self.hang_up(state);
                Ok(())
            }
        }
    }

    fn process_name(&self, state: &SessionState) -> String {
        if !state.is_readable() {
            return state.file().to_string();
        }
        self.host
            .process_name(self.fd, state.pty_id())
            .unwrap_or_else(|| state.file().to_string())
    }

    fn next_event(&mut self) -> impl Future<Output = Option<BackendEvent>> + Send {
        async move { self.transport.recv().await.map(BackendEvent::Transport) }
    }

    fn dispatch(&mut self, state: &mut SessionState, event: BackendEvent) -> PtyResult<()> {
        let event = match event {
            BackendEvent::Transport(event) => event,
            BackendEvent::Accepted(_) => {
                warn!("Ignoring data channel offered to direct pty {}", state.pty_id());
                return Ok(());
            }
        };

        match self.mode {
            Mode::Spawned => self.dispatch_spawned(state, event),
            Mode::Opened => self.dispatch_opened(state, event),
        }
    }
}
