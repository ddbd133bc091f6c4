//! Liveness tokens for client connections.
//!
//! A connection owns a [`ConnectionHandle`]; commands it issues only carry a
//! [`WeakConnection`] so they can tell whether their origin is still there
//! without keeping it alive.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug)]
struct ConnectionState {
    id: String,
    closed: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle(Arc<ConnectionState>);

impl ConnectionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::new(ConnectionState {
            id: id.into(),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection(Arc::downgrade(&self.0))
    }

    pub fn mark_closed(&self) {
        self.0.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }
}

#[derive(Clone, Default)]
pub struct WeakConnection(Weak<ConnectionState>);

impl WeakConnection {
    /// Id of the connection, if it is still open.
    pub fn id(&self) -> Option<String> {
        let state = self.0.upgrade()?;
        if state.closed.load(Ordering::Acquire) {
            return None;
        }
        Some(state.id.clone())
    }

    pub fn is_alive(&self) -> bool {
        self.id().is_some()
    }
}

impl PartialEq for WeakConnection {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for WeakConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.upgrade() {
            Some(s) => write!(f, "WeakConnection({})", s.id),
            None => f.write_str("WeakConnection(<gone>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_tracks_close_and_drop() {
        let conn = ConnectionHandle::new("c1");
        let weak = conn.downgrade();
        assert_eq!(weak.id().as_deref(), Some("c1"));

        conn.mark_closed();
        assert!(!weak.is_alive());

        let other = ConnectionHandle::new("c2");
        let weak2 = other.downgrade();
        drop(other);
        assert!(!weak2.is_alive());
    }
}
