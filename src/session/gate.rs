//! Readiness gate for backends whose transport becomes usable later
//!
//! Operations submitted before the gate opens are queued and replayed in
//! submission order when it opens. After that, operations run immediately.

use std::collections::VecDeque;

use crate::pty::{PtyError, PtyResult};

/// A queued operation. It receives the backend-side target and the session state.
pub type Deferred<T, S> = Box<dyn FnOnce(&mut T, &mut S) -> PtyResult<()> + Send>;

/// What `defer` did with an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferral {
    /// The gate was open and the operation ran
    Ran,
    /// The operation is waiting for readiness
    Queued,
}

/// FIFO of deferred operations plus a one-way readiness flag
pub struct ReadinessGate<T, S> {
    ready: bool,
    pending: VecDeque<Deferred<T, S>>,
}

impl<T, S> ReadinessGate<T, S> {
    /// Create a closed gate
    pub fn new() -> Self {
        Self {
            ready: false,
            pending: VecDeque::new(),
        }
    }

    /// The gate has opened
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of queued operations
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Run `op` now if the gate is open, otherwise queue it.
    ///
    /// Errors from an operation that runs immediately are returned as-is.
    pub fn defer<F>(&mut self, target: &mut T, state: &mut S, op: F) -> PtyResult<Deferral>
    where
        F: FnOnce(&mut T, &mut S) -> PtyResult<()> + Send + 'static,
    {
        if self.ready {
            op(target, state)?;
            return Ok(Deferral::Ran);
        }
        self.pending.push_back(Box::new(op));
        Ok(Deferral::Queued)
    }

    /// Open the gate and replay every queued operation once, in order.
    ///
    /// A failing operation does not stop the replay; all errors are returned
    /// in the order they occurred. Calling this on an open gate does nothing.
    pub fn mark_ready(&mut self, target: &mut T, state: &mut S) -> Vec<PtyError> {
        if self.ready {
            return Vec::new();
        }
        self.ready = true;

        let mut errors = Vec::new();
        while let Some(op) = self.pending.pop_front() {
            if let Err(e) = op(target, state) {
                errors.push(e);
            }
        }
        errors
    }
}

impl<T, S> Default for ReadinessGate<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S> std::fmt::Debug for ReadinessGate<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("ready", &self.ready)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Vec<String>;

    fn push(tag: &'static str) -> impl FnOnce(&mut Log, &mut u32) -> PtyResult<()> + Send {
        move |log, runs| {
            log.push(tag.to_string());
            *runs += 1;
            Ok(())
        }
    }

    #[test]
    fn test_queues_until_ready() {
        let mut gate = ReadinessGate::new();
        let mut log = Log::new();
        let mut runs = 0;

        assert_eq!(gate.defer(&mut log, &mut runs, push("write")).unwrap(), Deferral::Queued);
        assert_eq!(gate.defer(&mut log, &mut runs, push("resize")).unwrap(), Deferral::Queued);
        assert_eq!(gate.defer(&mut log, &mut runs, push("kill")).unwrap(), Deferral::Queued);
        assert!(log.is_empty());
        assert_eq!(gate.pending(), 3);

        let errors = gate.mark_ready(&mut log, &mut runs);
        assert!(errors.is_empty());
        assert_eq!(log, vec!["write", "resize", "kill"]);
        assert_eq!(gate.pending(), 0);
        assert_eq!(runs, 3);
    }

    #[test]
    fn test_runs_immediately_once_ready() {
        let mut gate = ReadinessGate::new();
        let mut log = Log::new();
        let mut runs = 0;

        gate.mark_ready(&mut log, &mut runs);
        assert_eq!(gate.defer(&mut log, &mut runs, push("write")).unwrap(), Deferral::Ran);
        assert_eq!(log, vec!["write"]);
        assert_eq!(gate.pending(), 0);
    }

    #[test]
    fn test_mark_ready_is_idempotent() {
        let mut gate = ReadinessGate::new();
        let mut log = Log::new();
        let mut runs = 0;

        gate.defer(&mut log, &mut runs, push("once")).unwrap();
        gate.mark_ready(&mut log, &mut runs);
        gate.mark_ready(&mut log, &mut runs);
        assert_eq!(runs, 1);
        assert!(gate.is_ready());
    }

    #[test]
    fn test_failures_do_not_stop_replay() {
        let mut gate = ReadinessGate::new();
        let mut log = Log::new();
        let mut runs = 0;

        gate.defer(&mut log, &mut runs, push("first")).unwrap();
        gate.defer(&mut log, &mut runs, |_, _| Err(PtyError::NotConnected))
            .unwrap();
        gate.defer(&mut log, &mut runs, push("third")).unwrap();

        let errors = gate.mark_ready(&mut log, &mut runs);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PtyError::NotConnected));
        assert_eq!(log, vec!["first", "third"]);
    }

    #[test]
    fn test_immediate_error_is_returned() {
        let mut gate: ReadinessGate<Log, u32> = ReadinessGate::new();
        let mut log = Log::new();
        let mut runs = 0;

        gate.mark_ready(&mut log, &mut runs);
        let result = gate.defer(&mut log, &mut runs, |_, _| Err(PtyError::SignalsUnsupported));
        assert!(matches!(result, Err(PtyError::SignalsUnsupported)));
    }
}
