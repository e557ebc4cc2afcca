//! Terminal sessions
//!
//! The backend-independent half of a pty session: lifecycle flags, the event
//! surface, the live-session registry and the readiness gate used by
//! backends that connect asynchronously.

mod backend;
mod events;
mod gate;
mod registry;
mod terminal;

pub(crate) use backend::Sealed;
pub use backend::{Backend, BackendEvent, Identity, SessionState};
pub use events::{EventEmitter, EventKind, ListenerId, SessionEvent};
pub use gate::{Deferral, Deferred, ReadinessGate};
pub use registry::{live_sessions, Registration, SessionRegistry, GLOBAL_REGISTRY};
pub use terminal::{Launcher, Terminal, REDRAW_DELAY};
