//! DashMap-based session storage implementation.

use std::sync::Arc;

use dashmap::DashMap;

use crate::shell::session::Session;

use super::traits::SessionStorage;

/// DashMap-based implementation of `SessionStorage`.
///
/// Locking is per shard, so inserting one user's session never blocks a
/// command running for another.
pub struct DashMapSessionStorage {
    sessions: DashMap<String, Arc<Session>>,
}

impl DashMapSessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl Default for DashMapSessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStorage for DashMapSessionStorage {
    fn get(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(user_id).map(|entry| entry.value().clone())
    }

    fn get_or_insert_with(
        &self,
        user_id: &str,
        create: &dyn Fn() -> Session,
    ) -> Arc<Session> {
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(create()))
            .value()
            .clone()
    }

    fn remove(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(user_id).map(|(_, session)| session)
    }

    fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    fn drain(&self) -> Vec<Arc<Session>> {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
