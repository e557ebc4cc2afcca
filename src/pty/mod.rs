//! PTY primitives
//!
//! Geometry, options, transports and errors shared by both backends, plus
//! the direct backend that owns a pty fd in this process.

mod direct;
mod error;
#[cfg(unix)]
mod native;
mod options;
mod size;
mod transport;

pub use direct::{Allocation, Direct, PtyHost, PtyPair, DEFAULT_SIGNAL};
pub use error::{classify, ErrorClass, PtyError, PtyResult};
#[cfg(unix)]
pub use native::NativePtyHost;
pub use options::{BackendProfile, OpenOptions, SpawnOptions, SpawnRequest, SANITIZED_VARS};
pub use size::{current_terminal_size, dimension, TerminalSize};
pub use transport::{Transport, TransportEvent, TransportSink};

#[cfg(test)]
pub(crate) use direct::tests::RecordingSink;
