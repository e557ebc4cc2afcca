//! Public event surface of a terminal session

use crate::pty::PtyError;

/// Kinds of events a session emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Data,
    Exit,
    Error,
    Close,
    Connect,
    End,
    Timeout,
    Drain,
}

/// An event delivered to session listeners
#[derive(Debug)]
pub enum SessionEvent<'a> {
    /// Output read from the pty
    Data(&'a [u8]),
    /// The session ended; emitted at most once
    Exit,
    /// A transport error that was not absorbed
    Error(&'a PtyError),
    /// The transport is gone
    Close,
    Connect,
    End,
    Timeout,
    Drain,
}

impl SessionEvent<'_> {
    /// The kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Data(_) => EventKind::Data,
            SessionEvent::Exit => EventKind::Exit,
            SessionEvent::Error(_) => EventKind::Error,
            SessionEvent::Close => EventKind::Close,
            SessionEvent::Connect => EventKind::Connect,
            SessionEvent::End => EventKind::End,
            SessionEvent::Timeout => EventKind::Timeout,
            SessionEvent::Drain => EventKind::Drain,
        }
    }

    /// Event without payload for `kind`, if that kind carries none
    pub fn signal(kind: EventKind) -> Option<SessionEvent<'static>> {
        match kind {
            EventKind::Exit => Some(SessionEvent::Exit),
            EventKind::Close => Some(SessionEvent::Close),
            EventKind::Connect => Some(SessionEvent::Connect),
            EventKind::End => Some(SessionEvent::End),
            EventKind::Timeout => Some(SessionEvent::Timeout),
            EventKind::Drain => Some(SessionEvent::Drain),
            EventKind::Data | EventKind::Error => None,
        }
    }
}

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Box<dyn FnMut(&SessionEvent<'_>) + Send>;

struct Listener {
    id: ListenerId,
    kind: EventKind,
    once: bool,
    handler: Handler,
}

/// Listener registry keyed by event kind
#[derive(Default)]
pub struct EventEmitter {
    next_id: u64,
    listeners: Vec<Listener>,
}

impl EventEmitter {
    /// Create an emitter with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` for every event of `kind`
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> ListenerId
    where
        F: FnMut(&SessionEvent<'_>) + Send + 'static,
    {
        self.add(kind, false, Box::new(handler))
    }

    /// Call `handler` for the next event of `kind` only
    pub fn once<F>(&mut self, kind: EventKind, handler: F) -> ListenerId
    where
        F: FnMut(&SessionEvent<'_>) + Send + 'static,
    {
        self.add(kind, true, Box::new(handler))
    }

    fn add(&mut self, kind: EventKind, once: bool, handler: Handler) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push(Listener {
            id,
            kind,
            once,
            handler,
        });
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Remove every listener of `kind`, or every listener when `kind` is `None`
    pub fn remove_all_listeners(&mut self, kind: Option<EventKind>) {
        match kind {
            Some(kind) => self.listeners.retain(|l| l.kind != kind),
            None => self.listeners.clear(),
        }
    }

    /// Number of listeners registered for `kind`
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.iter().filter(|l| l.kind == kind).count()
    }

    /// Deliver `event` to its listeners in registration order.
    ///
    /// Returns true if at least one listener saw it.
    pub fn emit(&mut self, event: &SessionEvent<'_>) -> bool {
        let kind = event.kind();
        let mut delivered = false;

        for listener in self.listeners.iter_mut().filter(|l| l.kind == kind) {
            (listener.handler)(event);
            delivered = true;
        }

        if delivered {
            self.listeners.retain(|l| !(l.once && l.kind == kind));
        }
        delivered
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
