//! Process-wide count of live sessions

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

/// Counter of live sessions
#[derive(Debug)]
pub struct SessionRegistry {
    live: AtomicUsize,
}

/// Registry used by sessions unless a launcher is given another one
pub static GLOBAL_REGISTRY: SessionRegistry = SessionRegistry::new();

/// Number of live sessions in this process
pub fn live_sessions() -> usize {
    GLOBAL_REGISTRY.live()
}

impl SessionRegistry {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
        }
    }

    /// Number of sessions registered and not yet released
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Count a newly constructed session
    pub fn register(&'static self) -> Registration {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Session registered, {} live", live);
        Registration {
            registry: self,
            released: false,
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One session's entry in a [`SessionRegistry`]
#[derive(Debug)]
pub struct Registration {
    registry: &'static SessionRegistry,
    released: bool,
}

impl Registration {
    /// Remove the session from the count. Only the first call has an effect.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        let live = self.registry.live.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("Session released, {} live", live);
        true
    }

    /// The session has already been released
    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_release() {
        static REGISTRY: SessionRegistry = SessionRegistry::new();

        let mut sessions: Vec<Registration> = (0..5).map(|_| REGISTRY.register()).collect();
        assert_eq!(REGISTRY.live(), 5);

        for registration in sessions.iter_mut().take(3) {
            assert!(registration.release());
        }
        assert_eq!(REGISTRY.live(), 2);
    }

    #[test]
    fn test_release_is_idempotent() {
        static REGISTRY: SessionRegistry = SessionRegistry::new();

        let mut registration = REGISTRY.register();
        assert!(registration.release());
        assert!(!registration.release());
        assert!(registration.is_released());
        assert_eq!(REGISTRY.live(), 0);
    }
}
