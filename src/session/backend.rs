//! Backend capability set and the session state backends operate on

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::events::{EventEmitter, SessionEvent};
use super::registry::Registration;
use crate::pty::{BackendProfile, PtyError, PtyResult, SpawnRequest, TerminalSize, Transport, TransportEvent};

/// Identity and geometry reported by a backend after construction
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Child pid, absent for an opened pty pair
    pub pid: Option<u32>,
    /// Native descriptor, absent on the agent backend
    pub fd: Option<i32>,
    /// Backend-assigned pty identifier
    pub pty_id: String,
    pub file: String,
    pub name: String,
    pub size: TerminalSize,
}

/// Something a backend's event source produced
#[derive(Debug)]
pub enum BackendEvent {
    /// The agent helper connected its data channel
    Accepted(Transport),
    /// An event on the session transport
    Transport(TransportEvent),
}

/// State shared by every session regardless of backend
#[derive(Debug)]
pub struct SessionState {
    identity: Identity,
    readable: bool,
    writable: bool,
    exit_emitted: bool,
    finished: bool,
    registration: Registration,
    events: EventEmitter,
}

impl SessionState {
    pub(crate) fn new(identity: Identity, registration: Registration) -> Self {
        Self {
            identity,
            readable: true,
            writable: true,
            exit_emitted: false,
            finished: false,
            registration,
            events: EventEmitter::new(),
        }
    }

    /// Child pid
    pub fn pid(&self) -> Option<u32> {
        self.identity.pid
    }

    /// Native descriptor
    pub fn fd(&self) -> Option<i32> {
        self.identity.fd
    }

    /// Backend-assigned pty identifier
    pub fn pty_id(&self) -> &str {
        &self.identity.pty_id
    }

    /// Program the session was spawned with
    pub fn file(&self) -> &str {
        &self.identity.file
    }

    /// Terminal name
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Current geometry
    pub fn size(&self) -> TerminalSize {
        self.identity.size
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// The transport has closed and no more events are expected
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub(crate) fn events_mut(&mut self) -> &mut EventEmitter {
        &mut self.events
    }

    pub(crate) fn set_size(&mut self, size: TerminalSize) {
        self.identity.size = size;
    }

    /// Flip the stream flags off. They never come back.
    pub(crate) fn close(&mut self) {
        self.readable = false;
        self.writable = false;
    }

    /// Leave the live-session count
    pub(crate) fn release(&mut self) {
        if self.registration.release() {
            debug!("Session {} left the registry", self.identity.pty_id);
        }
    }

    pub(crate) fn emit(&mut self, event: &SessionEvent<'_>) {
        self.events.emit(event);
    }

    /// Emit `exit` unless it was already emitted, releasing the registry entry with it
    pub(crate) fn emit_exit(&mut self) -> bool {
        if self.exit_emitted {
            return false;
        }
        self.exit_emitted = true;
        self.release();
        self.events.emit(&SessionEvent::Exit);
        true
    }

    /// Mark the transport as gone and emit `close` the first time
    pub(crate) fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.events.emit(&SessionEvent::Close);
    }

    /// Deliver `err` to error listeners, or hand it back when nobody listens
    pub(crate) fn escalate(&mut self, err: PtyError) -> PtyResult<()> {
        if self.events.listener_count(super::EventKind::Error) == 0 {
            return Err(err);
        }
        self.events.emit(&SessionEvent::Error(&err));
        Ok(())
    }
}

mod sealed {
    pub trait Sealed {}
}

pub(crate) use sealed::Sealed;

/// The capability set every backend provides.
///
/// A session picks its backend once, through its type parameter; nothing
/// branches on the backend per call.
pub trait Backend: Sized + Send + Sealed {
    /// Collaborator that performs the native pty work
    type Host: ?Sized + Send + Sync;

    /// Defaults for this backend
    const PROFILE: BackendProfile;

    /// Start a child process attached to a new pty
    fn spawn(host: Arc<Self::Host>, request: SpawnRequest) -> PtyResult<(Self, Identity)>;

    /// Allocate a pty pair without a child
    fn open(host: Arc<Self::Host>, size: TerminalSize) -> PtyResult<(Self, Identity)>;

    fn write(&mut self, state: &mut SessionState, data: &[u8]) -> PtyResult<()>;

    fn end(&mut self, state: &mut SessionState, data: Option<&[u8]>) -> PtyResult<()>;

    fn resize(&mut self, state: &mut SessionState, cols: i64, rows: i64) -> PtyResult<()>;

    fn kill(&mut self, state: &mut SessionState, signal: Option<&str>) -> PtyResult<()>;

    fn destroy(&mut self, state: &mut SessionState) -> PtyResult<()>;

    /// Best-effort name of the foreground process
    fn process_name(&self, state: &SessionState) -> String;

    /// Wait for the next event from the transport or the agent bridge
    fn next_event(&mut self) -> impl Future<Output = Option<BackendEvent>> + Send;

    /// Apply one event to the session
    fn dispatch(&mut self, state: &mut SessionState, event: BackendEvent) -> PtyResult<()>;
}
