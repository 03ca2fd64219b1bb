//! Per-process session registry (C6, spec.md §4.3, §5).
//!
//! "The per-process session registry is mutated only by the owning gateway
//! process; contention is resolved with a short in-memory mutex covering
//! insert/remove only (never held across I/O)" (spec.md §5). A plain
//! `std::sync::Mutex` rather than `tokio::sync::Mutex` is the right tool
//! here, since nothing ever awaits while holding it, the same choice
//! `bus::memory::MemoryBus` makes for its topic map.

use std::collections::HashSet;
use std::sync::Mutex;

use domain::AuctionId;
use uuid::Uuid;

/// `(auction_id, session_uid)`, the key spec.md §4.3 names for the
/// registry.
pub type SessionKey = (AuctionId, Uuid);

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashSet<SessionKey>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry::default()
    }

    /// Registers a session on `CONNECTING -> SUBSCRIBED` (spec.md §4.3
    /// state machine).
    pub fn insert(&self, key: SessionKey) {
        self.sessions.lock().expect("session registry poisoned").insert(key);
    }

    /// Deregisters on teardown (spec.md §4.3 "no persistent state
    /// references remain").
    pub fn remove(&self, key: &SessionKey) {
        self.sessions.lock().expect("session registry poisoned").remove(key);
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.lock().expect("session registry poisoned").contains(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_round_trip() {
        let registry = SessionRegistry::new();
        let key = (AuctionId::new(), Uuid::new_v4());
        assert!(!registry.contains(&key));

        registry.insert(key);
        assert!(registry.contains(&key));
        assert_eq!(registry.len(), 1);

        registry.remove(&key);
        assert!(!registry.contains(&key));
        assert!(registry.is_empty());
    }
}
