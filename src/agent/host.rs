//! Collaborators of the agent backend
//!
//! The helper process that owns the real pty is driven through
//! [`AgentHost`]. Its data channel arrives later, through the receiver
//! returned by [`AgentHost::listen`].

use std::io;
use std::path::PathBuf;

use tokio::sync::oneshot;

use crate::pty::{SpawnRequest, TerminalSize, Transport};

/// Helper process as reported by [`AgentHost::open`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentHandle {
    pub pid: u32,
    /// Usually absent; the helper owns the real descriptor
    pub fd: Option<i32>,
    pub pty_id: String,
}

/// Program the helper starts once the data channel is connected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub file: String,
    /// Arguments joined with single spaces
    pub args: String,
    /// `KEY=VALUE` pairs
    pub env: Vec<String>,
    /// Absolute working directory
    pub cwd: PathBuf,
}

impl Launch {
    pub fn from_request(request: &SpawnRequest) -> Self {
        Self {
            file: request.file.clone(),
            args: request.args.join(" "),
            env: request.environ(),
            cwd: request.cwd.clone(),
        }
    }

    /// Command line handed to the helper
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            return self.file.clone();
        }
        format!("{} {}", self.file, self.args)
    }
}

/// Native primitives of the agent backend
pub trait AgentHost: Send + Sync {
    /// Listen on `channel` and resolve with the first inbound connection
    fn listen(&self, channel: &str) -> io::Result<oneshot::Receiver<Transport>>;

    /// Start the helper process, pointing it at `channel`
    fn open(&self, channel: &str, size: TerminalSize, debug: bool) -> io::Result<AgentHandle>;

    /// Start the terminal program inside helper `pid`
    fn start_process(&self, pid: u32, launch: &Launch) -> io::Result<()>;

    fn resize(&self, pid: u32, size: TerminalSize) -> io::Result<()>;

    /// Terminate helper `pid`
    fn kill(&self, pid: u32) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::pty::SpawnOptions;
    use crate::session::Backend;
    use std::collections::BTreeMap;

    #[test]
    fn test_launch_joins_args() {
        let request = SpawnOptions::new()
            .with_env(BTreeMap::new())
            .resolve(
                "cmd.exe",
                &["/k".to_string(), "echo".to_string(), "hi".to_string()],
                &<Agent as Backend>::PROFILE,
            )
            .unwrap();

        let launch = Launch::from_request(&request);
        assert_eq!(launch.args, "/k echo hi");
        assert_eq!(launch.command_line(), "cmd.exe /k echo hi");
        assert!(launch.env.contains(&"TERM=Windows Shell".to_string()));
    }

    #[test]
    fn test_command_line_without_args() {
        let launch = Launch {
            file: "cmd.exe".to_string(),
            args: String::new(),
            env: Vec::new(),
            cwd: PathBuf::from("/"),
        };
        assert_eq!(launch.command_line(), "cmd.exe");
    }
}
