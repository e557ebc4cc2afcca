//! Terminal session
//!
//! The public entity wrapping one backend. Lifecycle operations go to the
//! backend; events come back through [`Terminal::dispatch`], usually driven by
//! [`Terminal::pump`] or [`Terminal::run`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::backend::{Backend, BackendEvent, SessionState};
use super::events::{EventKind, ListenerId, SessionEvent};
use super::registry::{SessionRegistry, GLOBAL_REGISTRY};
use crate::pty::{OpenOptions, PtyError, PtyResult, SpawnOptions, TerminalSize};

/// Delay before `redraw` restores the previous geometry
pub const REDRAW_DELAY: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, Copy)]
struct PendingRedraw {
    at: Instant,
    size: TerminalSize,
}

enum Step {
    Event(Option<BackendEvent>),
    Redraw,
}

/// A pseudo-terminal session
pub struct Terminal<B: Backend> {
    backend: B,
    state: SessionState,
    redraw: Option<PendingRedraw>,
}

impl<B: Backend> Terminal<B> {
    fn new(backend: B, state: SessionState) -> Self {
        Self {
            backend,
            state,
            redraw: None,
        }
    }

    /// Child pid, absent for an opened pty pair
    pub fn pid(&self) -> Option<u32> {
        self.state.pid()
    }

    /// Native descriptor
    pub fn fd(&self) -> Option<i32> {
        self.state.fd()
    }

    /// Backend-assigned pty identifier
    pub fn pty_id(&self) -> &str {
        self.state.pty_id()
    }

    /// Program the session was spawned with
    pub fn file(&self) -> &str {
        self.state.file()
    }

    /// Terminal name
    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn columns(&self) -> u16 {
        self.state.size().cols
    }

    pub fn rows(&self) -> u16 {
        self.state.size().rows
    }

    pub fn size(&self) -> TerminalSize {
        self.state.size()
    }

    pub fn readable(&self) -> bool {
        self.state.is_readable()
    }

    pub fn writable(&self) -> bool {
        self.state.is_writable()
    }

    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Name of the process in the foreground of the pty, falling back to the spawned file
    pub fn process_name(&self) -> String {
        self.backend.process_name(&self.state)
    }

    /// Listen for every event of `kind`
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> ListenerId
    where
        F: FnMut(&SessionEvent<'_>) + Send + 'static,
    {
        self.state.events_mut().on(kind, handler)
    }

    /// Listen for the next event of `kind`
    pub fn once<F>(&mut self, kind: EventKind, handler: F) -> ListenerId
    where
        F: FnMut(&SessionEvent<'_>) + Send + 'static,
    {
        self.state.events_mut().once(kind, handler)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.state.events_mut().remove_listener(id)
    }

    pub fn remove_all_listeners(&mut self, kind: Option<EventKind>) {
        self.state.events_mut().remove_all_listeners(kind)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.state.events().listener_count(kind)
    }

    /// Write bytes to the pty. A no-op once the session is closed.
    pub fn write(&mut self, data: impl AsRef<[u8]>) -> PtyResult<()> {
        self.backend.write(&mut self.state, data.as_ref())
    }

    /// Write a last chunk and stop writing
    pub fn end(&mut self, data: Option<&[u8]>) -> PtyResult<()> {
        self.backend.end(&mut self.state, data)
    }

    /// Resize the pty.
    ///
    /// Non-positive values keep the current dimension.
    pub fn resize(&mut self, cols: i64, rows: i64) -> PtyResult<()> {
        self.backend.resize(&mut self.state, cols, rows)
    }

    /// Force clients to repaint by growing the pty one cell, then restoring
    /// the size after [`REDRAW_DELAY`]. The restore runs from [`Terminal::pump`].
    pub fn redraw(&mut self) -> PtyResult<()> {
        let size = self.state.size();
        let grown = size.grown();
        self.resize(grown.cols.into(), grown.rows.into())?;
        self.redraw = Some(PendingRedraw {
            at: Instant::now() + REDRAW_DELAY,
            size,
        });
        Ok(())
    }

    /// Signal the child. `None` means the backend default.
    pub fn kill(&mut self, signal: Option<&str>) -> PtyResult<()> {
        self.backend.kill(&mut self.state, signal)
    }

    /// Close the transport and terminate the child
    pub fn destroy(&mut self) -> PtyResult<()> {
        self.backend.destroy(&mut self.state)
    }

    /// Apply one backend event.
    ///
    /// Returns an error only for transport failures nobody is listening for.
    pub fn dispatch(&mut self, event: BackendEvent) -> PtyResult<()> {
        self.backend.dispatch(&mut self.state, event)
    }

    /// Wait for and apply the next backend event or a due redraw.
    ///
    /// Returns `Ok(false)` when the session has nothing more to deliver.
    pub async fn pump(&mut self) -> PtyResult<bool> {
        if self.state.is_finished() && self.redraw.is_none() {
            return Ok(false);
        }

        let step = match self.redraw.map(|r| r.at) {
            Some(at) if self.state.is_finished() => {
                tokio::time::sleep_until(at).await;
                Step::Redraw
            }
            Some(at) => tokio::select! {
                event = self.backend.next_event() => Step::Event(event),
                _ = tokio::time::sleep_until(at) => Step::Redraw,
            },
            None => Step::Event(self.backend.next_event().await),
        };

        match step {
            Step::Event(Some(event)) => {
                self.dispatch(event)?;
                Ok(true)
            }
            Step::Event(None) => match self.redraw.take() {
                Some(redraw) => {
                    tokio::time::sleep_until(redraw.at).await;
                    self.finish_redraw(redraw)?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Step::Redraw => {
                if let Some(redraw) = self.redraw.take() {
                    self.finish_redraw(redraw)?;
                }
                Ok(true)
            }
        }
    }

    /// Pump until the session has nothing more to deliver
    pub async fn run(&mut self) -> PtyResult<()> {
        while self.pump().await? {}
        Ok(())
    }

    fn finish_redraw(&mut self, redraw: PendingRedraw) -> PtyResult<()> {
        if !self.state.is_readable() {
            debug!("Skipping redraw restore on closed session {}", self.pty_id());
            return Ok(());
        }
        self.resize(redraw.size.cols.into(), redraw.size.rows.into())
    }
}

impl<B: Backend> std::fmt::Debug for Terminal<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("pid", &self.pid())
            .field("pty_id", &self.pty_id())
            .field("size", &self.size())
            .field("readable", &self.readable())
            .finish()
    }
}

/// Creates sessions on one backend
pub struct Launcher<B: Backend> {
    host: Arc<B::Host>,
    registry: &'static SessionRegistry,
}

impl<B: Backend> Launcher<B> {
    /// Create a launcher using `host` for native pty work
    pub fn new(host: Arc<B::Host>) -> Self {
        Self {
            host,
            registry: &GLOBAL_REGISTRY,
        }
    }

    /// Count sessions in `registry` instead of the process-wide one
    pub fn with_registry(mut self, registry: &'static SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Number of live sessions in this launcher's registry
    pub fn live_sessions(&self) -> usize {
        self.registry.live()
    }

    /// Spawn `file` with `args` on a new pty
    pub fn spawn(
        &self,
        file: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> PtyResult<Terminal<B>> {
        let request = options
            .resolve(file, args, &B::PROFILE)
            .map_err(PtyError::SpawnFailed)?;
        let (backend, identity) = B::spawn(Arc::clone(&self.host), request)?;

        info!(
            "Spawned {} (pid {:?}) on {} at {}x{}",
            identity.file, identity.pid, identity.pty_id, identity.size.cols, identity.size.rows
        );

        let state = SessionState::new(identity, self.registry.register());
        Ok(Terminal::new(backend, state))
    }

    /// Open a pty pair without spawning a child
    pub fn open(&self, options: &OpenOptions) -> PtyResult<Terminal<B>> {
        let size = options.resolve(&B::PROFILE);
        let (backend, identity) = B::open(Arc::clone(&self.host), size)?;

        info!(
            "Opened {} at {}x{}",
            identity.pty_id, identity.size.cols, identity.size.rows
        );

        let state = SessionState::new(identity, self.registry.register());
        Ok(Terminal::new(backend, state))
    }
}

impl<B: Backend> Clone for Launcher<B> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            registry: self.registry,
        }
    }
}
