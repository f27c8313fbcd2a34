//! Storage trait for shell sessions.
//!
//! The registry depends on this trait rather than on a concrete map.

use std::sync::Arc;

use crate::shell::session::Session;

/// Trait for session storage operations.
///
/// Implementations must be thread-safe (`Send + Sync`) and must never hold
/// a lock across an `.await`: callers clone the `Arc<Session>` out and
/// release the entry before running any session operation.
pub trait SessionStorage: Send + Sync {
    /// Get a session by user id.
    fn get(&self, user_id: &str) -> Option<Arc<Session>>;

    /// Get the session for `user_id`, inserting the one built by `create`
    /// if there is none. Only one session is ever kept per user.
    fn get_or_insert_with(
        &self,
        user_id: &str,
        create: &dyn Fn() -> Session,
    ) -> Arc<Session>;

    /// Remove a session by user id, returning it if it existed.
    fn remove(&self, user_id: &str) -> Option<Arc<Session>>;

    /// All stored sessions.
    fn sessions(&self) -> Vec<Arc<Session>>;

    /// Remove and return every stored session.
    fn drain(&self) -> Vec<Arc<Session>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
