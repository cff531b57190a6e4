//! Pluggable storage for resumable sessions.
//!
//! Each manager owns its own store instance. The in-memory backend keeps one
//! reader/writer lock per map and never holds it across an `.await`.

use crate::models::session::Expiring;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

pub trait SessionStore<T>: Send + Sync {
    fn get(&self, id: &Uuid) -> Option<T>;

    /// Insert or replace a session.
    fn put(&self, id: Uuid, session: T);

    /// Remove a session, returning it if it was present.
    fn delete(&self, id: &Uuid) -> Option<T>;

    /// Remove and return every session expired at `now`.
    fn sweep(&self, now: DateTime<Utc>) -> Vec<T>;

    fn contains(&self, id: &Uuid) -> bool {
        self.get(id).is_some()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct InMemorySessionStore<T> {
    data: RwLock<HashMap<Uuid, T>>,
}

impl<T> Default for InMemorySessionStore<T> {
    fn default() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> InMemorySessionStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> SessionStore<T> for InMemorySessionStore<T>
where
    T: Clone + Expiring + Send + Sync,
{
    fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    fn put(&self, id: Uuid, session: T) {
        self.data.write().insert(id, session);
    }

    fn delete(&self, id: &Uuid) -> Option<T> {
        self.data.write().remove(id)
    }

    fn sweep(&self, now: DateTime<Utc>) -> Vec<T> {
        let mut guard = self.data.write();
        let expired: Vec<Uuid> = guard
            .iter()
            .filter(|(_, session)| session.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| guard.remove(&id))
            .collect()
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.data.read().contains_key(id)
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }
}
