//! Agent backend
//!
//! For platforms without native pty support: a helper process owns the
//! pseudo-terminal and exchanges data with this process over a named channel.

mod backend;
mod bridge;
mod host;
#[cfg(windows)]
mod pipe;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::Agent;
pub use bridge::{channel_name, forwarded_kind, AgentBridge, FORWARDED_EVENTS};
pub use host::{AgentHandle, AgentHost, Launch};
#[cfg(windows)]
pub use pipe::listen_named_pipe;
