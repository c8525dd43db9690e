//! Dial-side session tracking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::mux::{ChannelCloser, Session};

/// What the adapter needs to close a dialed connection it does not own.
#[derive(Debug, Clone)]
pub(crate) struct Dialed {
    pub channel: ChannelCloser,
    pub session: Session,
}

/// Connections opened by dial that the adapter still has to close.
#[derive(Debug, Default)]
pub(crate) struct DialRegistry {
    next: AtomicU64,
    sessions: Mutex<HashMap<u64, Dialed>>,
}

impl DialRegistry {
    pub fn register(self: &Arc<Self>, dialed: Dialed) -> Registration {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.sessions.lock().insert(id, dialed);
        Registration {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Take every tracked connection, oldest first.
    pub fn drain(&self) -> Vec<Dialed> {
        let mut drained: Vec<(u64, Dialed)> = self.sessions.lock().drain().collect();
        drained.sort_unstable_by_key(|(id, _)| *id);
        drained.into_iter().map(|(_, dialed)| dialed).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Membership of one dialed connection; leaving scope untracks it.
#[derive(Debug)]
pub(crate) struct Registration {
    id: u64,
    registry: Weak<DialRegistry>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let removed = registry.sessions.lock().remove(&self.id);
            drop(removed);
        }
    }
}
