use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    events::{ANONYMOUS_USER, Attributes, Event},
    storage::KeyValueStore,
};

/// Resolves the signed-in user for newly recorded events.
pub trait UserResolver: Send + Sync + 'static {
    fn resolve(&self) -> Option<String>;
}

pub struct AnonymousUser;

impl UserResolver for AnonymousUser {
    fn resolve(&self) -> Option<String> {
        None
    }
}

/// Reads the persisted session record (`{"userId": "..."}`) from the
/// key-value store on every lookup, so a login mid-session is picked up.
pub struct StoredSessionUser {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    user_id: Option<String>,
}

impl StoredSessionUser {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

impl UserResolver for StoredSessionUser {
    fn resolve(&self) -> Option<String> {
        let raw = match self.store.get(&self.key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::debug!(key = %self.key, error = %e, "session lookup failed");
                return None;
            }
        };

        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(session) => session.user_id.filter(|id| !id.trim().is_empty()),
            Err(e) => {
                tracing::debug!(key = %self.key, error = %e, "session record is malformed");
                None
            }
        }
    }
}

/// Per-instance metadata attached to every event.
#[derive(Clone)]
pub struct SessionContext {
    session_id: Uuid,
    user: Arc<dyn UserResolver>,
}

impl SessionContext {
    pub fn new(user: Arc<dyn UserResolver>) -> Self {
        Self::with_session_id(Uuid::new_v4(), user)
    }

    pub fn with_session_id(session_id: Uuid, user: Arc<dyn UserResolver>) -> Self {
        Self { session_id, user }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn user_id(&self) -> String {
        self.user
            .resolve()
            .unwrap_or_else(|| ANONYMOUS_USER.to_string())
    }

    pub fn stamp(&self, name: impl Into<String>, attributes: Attributes) -> Event {
        Event::new(
            name,
            attributes,
            self.session_id.to_string(),
            self.user_id(),
            Utc::now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn anonymous_sentinel_when_no_session_is_stored() {
        let store = Arc::new(MemoryStore::new());
        let ctx = SessionContext::new(Arc::new(StoredSessionUser::new(store, "session")));

        let event = ctx.stamp("page_view", Attributes::new());
        assert_eq!(event.user_id(), ANONYMOUS_USER);
        assert_eq!(event.session_id(), ctx.session_id().to_string());
    }

    #[test]
    fn user_id_follows_the_stored_session() {
        let store = Arc::new(MemoryStore::new());
        let ctx = SessionContext::new(Arc::new(StoredSessionUser::new(
            store.clone(),
            "session",
        )));

        store.set("session", r#"{"userId":"user-7"}"#).unwrap();
        assert_eq!(ctx.stamp("login", Attributes::new()).user_id(), "user-7");

        store.set("session", "not json").unwrap();
        assert_eq!(ctx.user_id(), ANONYMOUS_USER);
    }

    #[test]
    fn session_id_is_stable_across_events() {
        let ctx = SessionContext::new(Arc::new(AnonymousUser));
        let a = ctx.stamp("a", Attributes::new());
        let b = ctx.stamp("b", Attributes::new());
        assert_eq!(a.session_id(), b.session_id());
        assert!(a.timestamp() <= b.timestamp());
    }
}
