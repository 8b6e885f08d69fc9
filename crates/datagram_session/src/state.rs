use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::context::CancelHandle;

/// Lifecycle of a [`Session`](crate::Session).
///
/// `Created -> Running -> Closing -> Closed`. A session closed before it is
/// run goes straight from `Created` to `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Created = 0,
    Running = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionState::Created,
            1 => SessionState::Running,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    /// Returns true once termination has been triggered.
    pub fn is_terminating(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Running => "running",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The state machine shared between a session, its idle supervisor, and
/// anyone calling `close`.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
    cancel: CancelHandle,
}

impl Lifecycle {
    pub(crate) fn new(cancel: CancelHandle) -> Self {
        Self {
            state: AtomicU8::new(SessionState::Created as u8),
            cancel,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Created -> Running`. Returns false if the session was closed first.
    pub(crate) fn start(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Created as u8,
                SessionState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Cancel the session context and enter `Closing`.
    ///
    /// Returns true for the call that performed the transition.
    pub(crate) fn close(&self) -> bool {
        self.cancel.cancel();
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match SessionState::from_u8(raw) {
                    SessionState::Created | SessionState::Running => {
                        Some(SessionState::Closing as u8)
                    }
                    SessionState::Closing | SessionState::Closed => None,
                }
            })
            .is_ok()
    }

    pub(crate) fn finish(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::Release);
    }
}
