//! Pseudo-terminal sessions with one lifecycle over two backends
//!
//! [`Terminal`] is generic over a [`Backend`]: [`Direct`] owns a pty fd in
//! this process, [`Agent`] drives a helper process that owns the pty and
//! connects back over a named channel. Both emit the same events and keep
//! the same process-wide live-session count.
//!
//! ```no_run
//! # async fn demo() -> partty::PtyResult<()> {
//! use partty::{EventKind, SessionEvent, SpawnOptions};
//!
//! let mut term = partty::spawn("sh", &[], &SpawnOptions::new().with_size(100, 30))?;
//! term.on(EventKind::Data, |event| {
//!     if let SessionEvent::Data(bytes) = event {
//!         print!("{}", String::from_utf8_lossy(bytes));
//!     }
//! });
//! term.write("echo hello; exit\n")?;
//! term.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod pty;
pub mod session;

pub use agent::{Agent, AgentHost};
pub use pty::{
    Direct, OpenOptions, PtyError, PtyHost, PtyResult, SpawnOptions, TerminalSize, Transport,
    TransportEvent,
};
pub use session::{
    live_sessions, Backend, BackendEvent, EventKind, Launcher, ListenerId, SessionEvent,
    SessionRegistry, Terminal,
};

#[cfg(unix)]
pub use pty::NativePtyHost;

/// Backend used natively on this platform
#[cfg(unix)]
pub type PlatformBackend = Direct;

/// Backend used natively on this platform
#[cfg(not(unix))]
pub type PlatformBackend = Agent;

/// A launcher over the operating system's pty support
#[cfg(unix)]
pub fn launcher() -> Launcher<Direct> {
    let host: std::sync::Arc<dyn PtyHost> = std::sync::Arc::new(NativePtyHost::new());
    Launcher::new(host)
}

/// Spawn `file` with `args` on a new pty
#[cfg(unix)]
pub fn spawn(file: &str, args: &[String], options: &SpawnOptions) -> PtyResult<Terminal<Direct>> {
    launcher().spawn(file, args, options)
}

/// Open a pty pair without spawning a child
#[cfg(unix)]
pub fn open(options: &OpenOptions) -> PtyResult<Terminal<Direct>> {
    launcher().open(options)
}
