use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Outcome of a detach: which user owned the connection, and whether that
/// was their last one.
#[derive(Debug, PartialEq, Eq)]
pub struct Detached {
    pub user_id: String,
    pub fully_departed: bool,
}

#[derive(Default)]
struct Inner {
    by_user: HashMap<String, HashSet<String>>,
    by_connection: HashMap<String, String>,
}

/// In-process mapping user id → set of live connection ids, with the reverse
/// index for `user_of`. Mutations and lookups are atomic under one lock;
/// none of the operations suspend.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, user_id: &str, connection_id: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
        inner
            .by_connection
            .insert(connection_id.to_string(), user_id.to_string());
    }

    /// Remove a connection. Returns the owning user and whether the user now
    /// has zero connections, so the caller can decide on an offline
    /// transition.
    pub fn detach(&self, connection_id: &str) -> Option<Detached> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let user_id = inner.by_connection.remove(connection_id)?;
        let fully_departed = match inner.by_user.get_mut(&user_id) {
            Some(connections) => {
                connections.remove(connection_id);
                if connections.is_empty() {
                    inner.by_user.remove(&user_id);
                    true
                } else {
                    false
                }
            }
            None => true,
        };
        Some(Detached { user_id, fully_departed })
    }

    pub fn user_of(&self, connection_id: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_connection.get(connection_id).cloned()
    }

    pub fn connections_of(&self, user_id: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_user
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_user.get(user_id).map(|set| set.len()).unwrap_or(0)
    }
}
