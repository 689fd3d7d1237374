//! In-memory conversation store.
//!
//! Maps a caller-chosen session id to the ordered history of turns in that
//! session. Histories are append-only and live until the process exits, or until
//! the session is evicted when a `max_sessions` bound is configured.
//!
//! Each history sits behind its own async mutex. Holding a [`SessionHandle`] lock
//! across a model call serialises requests for one session while other sessions
//! proceed independently. The session map lock is only held while looking up or
//! inserting a handle.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used when rendering a transcript.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only history of one session.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    turns: Vec<Turn>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a turn at the end of the history.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Every stored turn, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns (fewer if the history is shorter), oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Shared, lockable handle to one session's history.
pub type SessionHandle = Arc<Mutex<SessionHistory>>;

/// Process-wide mapping from session id to history.
pub struct ConversationStore {
    sessions: Mutex<LruCache<String, SessionHandle>>,
    max_sessions: Option<NonZeroUsize>,
}

impl ConversationStore {
    /// Create a store with no session bound.
    pub fn new() -> Self {
        Self::with_max_sessions(None)
    }

    /// Create a store that keeps at most `max_sessions` sessions, evicting the
    /// least recently used idle one when a new session arrives. `None` or
    /// `Some(0)` leaves the store unbounded.
    ///
    /// A session whose handle is still held elsewhere (a request in flight) is
    /// never evicted. When every session is busy the store grows past the bound
    /// and shrinks back on a later insert.
    pub fn with_max_sessions(max_sessions: Option<usize>) -> Self {
        Self {
            sessions: Mutex::new(LruCache::unbounded()),
            max_sessions: max_sessions.and_then(NonZeroUsize::new),
        }
    }

    /// Return the history handle for `session_id`, creating an empty one if absent.
    pub async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;

        if let Some(handle) = sessions.get(session_id) {
            return handle.clone();
        }

        if let Some(cap) = self.max_sessions {
            evict_idle(&mut sessions, cap.get());
        }

        let handle: SessionHandle = Arc::new(Mutex::new(SessionHistory::new()));
        sessions.put(session_id.to_string(), handle.clone());
        tracing::debug!(session_id = %session_id, sessions = sessions.len(), "Created session");

        handle
    }

    /// Append `turn` to the history of `session_id`.
    pub async fn append(&self, session_id: &str, turn: Turn) {
        let handle = self.get_or_create(session_id).await;
        handle.lock().await.push(turn);
    }

    /// Snapshot of the full stored history of `session_id`.
    pub async fn history(&self, session_id: &str) -> Option<Vec<Turn>> {
        let handle = self.sessions.lock().await.peek(session_id).cloned()?;
        let history = handle.lock().await;
        Some(history.turns().to_vec())
    }

    /// Whether `session_id` currently has a history.
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains(session_id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Drop least recently used sessions until there is room for one more.
///
/// Handles are only cloned out while the map lock is held, so a strong count of
/// one means no request holds the session right now.
fn evict_idle(sessions: &mut LruCache<String, SessionHandle>, cap: usize) {
    while sessions.len() >= cap {
        let idle = sessions
            .iter()
            .rev()
            .find(|(_, handle)| Arc::strong_count(handle) == 1)
            .map(|(id, _)| id.clone());

        match idle {
            Some(id) => {
                sessions.pop(&id);
                tracing::debug!(session_id = %id, "Evicted least recently used session");
            }
            None => {
                tracing::debug!(
                    sessions = sessions.len(),
                    max_sessions = cap,
                    "All sessions busy, exceeding session bound"
                );
                break;
            }
        }
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut history = SessionHistory::new();
        for i in 0..8 {
            history.push(Turn::user(format!("m{i}")));
        }

        let recent: Vec<&str> = history.recent(6).iter().map(|t| t.content.as_str()).collect();
        assert_eq!(recent, vec!["m2", "m3", "m4", "m5", "m6", "m7"]);
        assert_eq!(history.len(), 8);
    }

    #[test]
    fn recent_on_short_history_returns_everything() {
        let mut history = SessionHistory::new();
        history.push(Turn::user("only"));
        assert_eq!(history.recent(6).len(), 1);
        assert!(SessionHistory::new().recent(6).is_empty());
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = ConversationStore::new();
        let first = store.get_or_create("alice").await;
        let second = store.get_or_create("alice").await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len().await, 1);
        assert!(first.lock().await.is_empty());
    }

    #[tokio::test]
    async fn append_keeps_arrival_order() {
        let store = ConversationStore::new();
        store.append("s", Turn::user("hello")).await;
        store.append("s", Turn::assistant("hi")).await;
        store.append("s", Turn::user("hello")).await;

        let history = store.history("s").await.unwrap();
        assert_eq!(
            history,
            vec![Turn::user("hello"), Turn::assistant("hi"), Turn::user("hello")]
        );
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = ConversationStore::new();
        store.append("a", Turn::user("for a")).await;
        store.append("b", Turn::user("for b")).await;

        assert_eq!(store.history("a").await.unwrap(), vec![Turn::user("for a")]);
        assert_eq!(store.history("b").await.unwrap(), vec![Turn::user("for b")]);
        assert!(store.history("c").await.is_none());
        assert!(!store.contains("c").await);
    }

    #[tokio::test]
    async fn bounded_store_evicts_least_recently_used() {
        let store = ConversationStore::with_max_sessions(Some(2));
        store.append("a", Turn::user("1")).await;
        store.append("b", Turn::user("2")).await;
        // touch "a" so "b" becomes the eviction candidate
        store.get_or_create("a").await;
        store.append("c", Turn::user("3")).await;

        assert_eq!(store.len().await, 2);
        assert!(store.contains("a").await);
        assert!(!store.contains("b").await);
        assert!(store.contains("c").await);
    }

    #[tokio::test]
    async fn busy_session_is_not_evicted() {
        let store = ConversationStore::with_max_sessions(Some(1));
        store.append("a", Turn::user("first")).await;

        // A request on "a" is still holding its handle
        let in_flight = store.get_or_create("a").await;
        let mut history = in_flight.lock().await;

        store.append("b", Turn::user("other")).await;
        assert!(store.contains("a").await);
        assert!(store.contains("b").await);
        assert_eq!(store.len().await, 2);

        history.push(Turn::assistant("reply"));
        drop(history);
        drop(in_flight);

        // Once idle, both older sessions make room for the new one
        store.append("c", Turn::user("third")).await;
        assert_eq!(store.len().await, 1);
        assert!(store.contains("c").await);
        assert!(!store.contains("a").await);
    }

    #[tokio::test]
    async fn busy_session_keeps_identity_for_later_requests() {
        let store = ConversationStore::with_max_sessions(Some(1));
        let in_flight = store.get_or_create("s").await;

        store.get_or_create("t").await;
        let again = store.get_or_create("s").await;

        assert!(Arc::ptr_eq(&in_flight, &again));
    }

    #[tokio::test]
    async fn zero_bound_means_unbounded() {
        let store = ConversationStore::with_max_sessions(Some(0));
        for i in 0..10 {
            store.append(&format!("s{i}"), Turn::user("x")).await;
        }
        assert_eq!(store.len().await, 10);
    }
}
