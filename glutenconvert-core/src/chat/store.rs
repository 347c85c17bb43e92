//! Append-only chat log, keyed by session scope
//!
//! A scope is either a signed-in user id or a local anonymous identifier.
//! Messages are immutable once appended; the only bulk operation is clearing
//! the whole log.

use std::sync::Arc;

use crate::db::Database;
use crate::error::Result;
use crate::types::Message;

/// Greeting seeded into an empty log when a session opens
pub const WELCOME_MESSAGE: &str = "Hi! I'm GlutenConvert, your AI recipe assistant. \
    I can help you create gluten-free recipes, convert existing recipes, scan \
    ingredients for safety, or answer any gluten-free cooking questions. What \
    would you like to do today?";

/// Handle on one scope's chat log. Cheap to clone; clones share the log.
#[derive(Clone)]
pub struct ChatSessionStore {
    db: Arc<Database>,
    scope: String,
}

impl ChatSessionStore {
    pub fn new(db: Arc<Database>, scope: impl Into<String>) -> Self {
        Self {
            db,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Append a message. Ordering is insertion order; existing messages are
    /// never touched.
    pub fn append(&self, message: &Message) -> Result<()> {
        self.db.append_message(&self.scope, message)
    }

    /// The full ordered log
    pub fn all(&self) -> Result<Vec<Message>> {
        self.db.get_messages(&self.scope)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.db.count_messages(&self.scope)? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Empty the log. Messages in other scopes are unaffected.
    pub fn clear(&self) -> Result<()> {
        tracing::info!(scope = %self.scope, "Clearing chat log");
        self.db.clear_messages(&self.scope)
    }

    /// Seed the greeting into an empty log. A log that already has messages
    /// is left alone, so reopening a session never duplicates the greeting.
    pub fn ensure_welcome(&self) -> Result<()> {
        if self.is_empty()? {
            self.append(&Message::assistant(WELCOME_MESSAGE))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(scope: &str) -> ChatSessionStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        ChatSessionStore::new(db, scope)
    }

    #[test]
    fn test_append_and_read_back() {
        let store = store("user-1");
        store.append(&Message::user("hello")).unwrap();
        store.append(&Message::assistant("hi there")).unwrap();

        let log = store.all().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].text, "hello");
        assert!(!log[1].is_from_user);
    }

    #[test]
    fn test_clear_empties_the_log() {
        let store = store("user-1");
        store.append(&Message::user("hello")).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_welcome_seeded_once() {
        let store = store("user-1");
        store.ensure_welcome().unwrap();
        store.ensure_welcome().unwrap();

        let log = store.all().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, WELCOME_MESSAGE);

        // Not reseeded while the log has content
        store.append(&Message::user("hello")).unwrap();
        store.ensure_welcome().unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_clones_share_the_log() {
        let store = store("user-1");
        let other = store.clone();
        store.append(&Message::user("from original")).unwrap();
        assert_eq!(other.len().unwrap(), 1);
    }
}
