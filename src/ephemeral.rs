//! Ephemeral store adapter: sessions, presence, typing sets, offline queues,
//! rate counters, and the room-membership cache, all under fixed key
//! prefixes. Redis in production; an in-memory implementation with the same
//! TTL semantics backs tests and single-process development.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, IntoConnectionInfo};

use crate::error::EphemeralError;

/// Session mirror TTL, heartbeat-renewed.
pub const SESSION_TTL: u64 = 86_400;
/// Presence key TTL; absence of the key means offline.
pub const PRESENCE_TTL: u64 = 300;
/// Membership cache TTL. The cache is advisory; the repository is
/// authoritative.
pub const ROOM_MEMBERS_TTL: u64 = 300;

fn session_key(user_id: &str, connection_id: &str) -> String {
    format!("session:{user_id}:{connection_id}")
}

fn presence_key(user_id: &str) -> String {
    format!("presence:{user_id}")
}

fn queue_key(user_id: &str) -> String {
    format!("queue:{user_id}")
}

fn typing_key(room_id: &str) -> String {
    format!("typing:{room_id}")
}

fn room_members_key(room_id: &str) -> String {
    format!("room_members:{room_id}")
}

fn ratelimit_key(user_id: &str) -> String {
    format!("ratelimit:{user_id}")
}

type Result<T> = std::result::Result<T, EphemeralError>;

/// Typed operations over the key/value service. All operations are
/// idempotent except `queue_message`.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    // --- Sessions ---

    /// Mirror a session as JSON text under `session:{user}:{connection}`.
    async fn set_user_session(
        &self,
        user_id: &str,
        connection_id: &str,
        claims: &serde_json::Value,
        ttl: u64,
    ) -> Result<()>;
    async fn get_user_session(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Result<Option<serde_json::Value>>;
    async fn delete_user_session(&self, user_id: &str, connection_id: &str) -> Result<()>;
    /// Enumerate a user's connection ids across all hub instances.
    async fn user_connections(&self, user_id: &str) -> Result<Vec<String>>;

    // --- Presence ---

    async fn set_user_online(&self, user_id: &str, status: &str) -> Result<()>;
    async fn set_user_offline(&self, user_id: &str) -> Result<()>;
    async fn is_user_online(&self, user_id: &str) -> Result<bool>;
    async fn get_user_status(&self, user_id: &str) -> Result<Option<String>>;

    // --- Offline queue ---

    /// Head-append an envelope to the user's queue.
    async fn queue_message(&self, user_id: &str, envelope: &str, retention: u64) -> Result<()>;
    /// Fetch the full queue and delete the key. Consumed exactly once.
    async fn drain_queued_messages(&self, user_id: &str) -> Result<Vec<String>>;

    // --- Rate limiting ---

    /// Fixed-window counter: first write sets the TTL, increments never
    /// refresh it. Returns whether the caller may proceed.
    async fn check_rate_limit(&self, user_id: &str, limit: u32, window: u64) -> Result<bool>;

    // --- Typing indicators ---

    async fn set_typing(&self, room_id: &str, user_id: &str, ttl: u64) -> Result<()>;
    async fn remove_typing(&self, room_id: &str, user_id: &str) -> Result<()>;
    async fn typing_users(&self, room_id: &str) -> Result<Vec<String>>;

    // --- Room membership cache ---

    async fn cache_room_members(&self, room_id: &str, member_ids: &[String]) -> Result<()>;
    async fn cached_room_members(&self, room_id: &str) -> Result<Option<Vec<String>>>;
}

// --- Redis implementation ---

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect and hold a reconnecting managed connection. `REDIS_PASSWORD`
    /// overrides any password embedded in the URL.
    pub async fn connect(url: &str, password: Option<&str>) -> Result<Self> {
        let mut info = url.into_connection_info()?;
        if let Some(password) = password {
            info.redis.password = Some(password.to_string());
        }
        let client = redis::Client::open(info)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(RedisStore { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl EphemeralStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_user_session(
        &self,
        user_id: &str,
        connection_id: &str,
        claims: &serde_json::Value,
        ttl: u64,
    ) -> Result<()> {
        let payload = serde_json::to_string(claims)
            .map_err(|e| EphemeralError::BadValue(e.to_string()))?;
        let mut conn = self.conn();
        let _: () = conn.set_ex(session_key(user_id, connection_id), payload, ttl).await?;
        Ok(())
    }

    async fn get_user_session(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Result<Option<serde_json::Value>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(session_key(user_id, connection_id)).await?;
        match raw {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| EphemeralError::BadValue(e.to_string())),
            None => Ok(None),
        }
    }

    async fn delete_user_session(&self, user_id: &str, connection_id: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.del(session_key(user_id, connection_id)).await?;
        Ok(())
    }

    async fn user_connections(&self, user_id: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let keys: Vec<String> = conn.keys(format!("session:{user_id}:*")).await?;
        Ok(keys
            .iter()
            .filter_map(|k| k.rsplit(':').next().map(String::from))
            .collect())
    }

    async fn set_user_online(&self, user_id: &str, status: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.set_ex(presence_key(user_id), status, PRESENCE_TTL).await?;
        Ok(())
    }

    async fn set_user_offline(&self, user_id: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.del(presence_key(user_id)).await?;
        Ok(())
    }

    async fn is_user_online(&self, user_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        Ok(conn.exists(presence_key(user_id)).await?)
    }

    async fn get_user_status(&self, user_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        Ok(conn.get(presence_key(user_id)).await?)
    }

    async fn queue_message(&self, user_id: &str, envelope: &str, retention: u64) -> Result<()> {
        let key = queue_key(user_id);
        let mut conn = self.conn();
        let _: () = conn.lpush(&key, envelope).await?;
        let _: () = conn.expire(&key, retention as i64).await?;
        Ok(())
    }

    async fn drain_queued_messages(&self, user_id: &str) -> Result<Vec<String>> {
        let key = queue_key(user_id);
        let mut conn = self.conn();
        let envelopes: Vec<String> = conn.lrange(&key, 0, -1).await?;
        let _: () = conn.del(&key).await?;
        Ok(envelopes)
    }

    async fn check_rate_limit(&self, user_id: &str, limit: u32, window: u64) -> Result<bool> {
        let key = ratelimit_key(user_id);
        let mut conn = self.conn();
        let current: Option<i64> = conn.get(&key).await?;
        match current {
            None => {
                let _: () = conn.set_ex(&key, 1, window).await?;
                Ok(true)
            }
            Some(count) if count >= i64::from(limit) => Ok(false),
            Some(_) => {
                let _: i64 = conn.incr(&key, 1).await?;
                Ok(true)
            }
        }
    }

    async fn set_typing(&self, room_id: &str, user_id: &str, ttl: u64) -> Result<()> {
        let key = typing_key(room_id);
        let mut conn = self.conn();
        let _: () = conn.sadd(&key, user_id).await?;
        let _: () = conn.expire(&key, ttl as i64).await?;
        Ok(())
    }

    async fn remove_typing(&self, room_id: &str, user_id: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.srem(typing_key(room_id), user_id).await?;
        Ok(())
    }

    async fn typing_users(&self, room_id: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        Ok(conn.smembers(typing_key(room_id)).await?)
    }

    async fn cache_room_members(&self, room_id: &str, member_ids: &[String]) -> Result<()> {
        let key = room_members_key(room_id);
        let mut conn = self.conn();
        let _: () = conn.del(&key).await?;
        if !member_ids.is_empty() {
            let _: () = conn.sadd(&key, member_ids).await?;
            let _: () = conn.expire(&key, ROOM_MEMBERS_TTL as i64).await?;
        }
        Ok(())
    }

    async fn cached_room_members(&self, room_id: &str) -> Result<Option<Vec<String>>> {
        let key = room_members_key(room_id);
        let mut conn = self.conn();
        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Ok(None);
        }
        Ok(Some(conn.smembers(&key).await?))
    }
}

// --- In-memory implementation ---

enum Value {
    Text(String),
    List(Vec<String>),
    Set(HashSet<String>),
    Counter(i64),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory store with real TTL expiry, for tests and single-process
/// development without a Redis.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| !entry.expired());
        f(&mut entries)
    }
}

fn deadline(ttl: u64) -> Option<Instant> {
    Some(Instant::now() + Duration::from_secs(ttl))
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn set_user_session(
        &self,
        user_id: &str,
        connection_id: &str,
        claims: &serde_json::Value,
        ttl: u64,
    ) -> Result<()> {
        let payload = serde_json::to_string(claims)
            .map_err(|e| EphemeralError::BadValue(e.to_string()))?;
        self.with_entries(|entries| {
            entries.insert(
                session_key(user_id, connection_id),
                Entry { value: Value::Text(payload), expires_at: deadline(ttl) },
            );
        });
        Ok(())
    }

    async fn get_user_session(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Result<Option<serde_json::Value>> {
        self.with_entries(|entries| {
            match entries.get(&session_key(user_id, connection_id)).map(|e| &e.value) {
                Some(Value::Text(text)) => serde_json::from_str(text)
                    .map(Some)
                    .map_err(|e| EphemeralError::BadValue(e.to_string())),
                _ => Ok(None),
            }
        })
    }

    async fn delete_user_session(&self, user_id: &str, connection_id: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.remove(&session_key(user_id, connection_id));
        });
        Ok(())
    }

    async fn user_connections(&self, user_id: &str) -> Result<Vec<String>> {
        let prefix = format!("session:{user_id}:");
        Ok(self.with_entries(|entries| {
            entries
                .keys()
                .filter_map(|k| k.strip_prefix(&prefix).map(String::from))
                .collect()
        }))
    }

    async fn set_user_online(&self, user_id: &str, status: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(
                presence_key(user_id),
                Entry { value: Value::Text(status.to_string()), expires_at: deadline(PRESENCE_TTL) },
            );
        });
        Ok(())
    }

    async fn set_user_offline(&self, user_id: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.remove(&presence_key(user_id));
        });
        Ok(())
    }

    async fn is_user_online(&self, user_id: &str) -> Result<bool> {
        Ok(self.with_entries(|entries| entries.contains_key(&presence_key(user_id))))
    }

    async fn get_user_status(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.with_entries(|entries| match entries.get(&presence_key(user_id)).map(|e| &e.value) {
            Some(Value::Text(status)) => Some(status.clone()),
            _ => None,
        }))
    }

    async fn queue_message(&self, user_id: &str, envelope: &str, retention: u64) -> Result<()> {
        self.with_entries(|entries| {
            let entry = entries.entry(queue_key(user_id)).or_insert_with(|| Entry {
                value: Value::List(Vec::new()),
                expires_at: None,
            });
            if let Value::List(list) = &mut entry.value {
                list.insert(0, envelope.to_string());
            }
            entry.expires_at = deadline(retention);
        });
        Ok(())
    }

    async fn drain_queued_messages(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self.with_entries(|entries| {
            match entries.remove(&queue_key(user_id)).map(|e| e.value) {
                Some(Value::List(list)) => list,
                _ => Vec::new(),
            }
        }))
    }

    async fn check_rate_limit(&self, user_id: &str, limit: u32, window: u64) -> Result<bool> {
        Ok(self.with_entries(|entries| {
            match entries.get_mut(&ratelimit_key(user_id)) {
                None => {
                    entries.insert(
                        ratelimit_key(user_id),
                        Entry { value: Value::Counter(1), expires_at: deadline(window) },
                    );
                    true
                }
                Some(entry) => match &mut entry.value {
                    Value::Counter(count) if *count >= i64::from(limit) => false,
                    Value::Counter(count) => {
                        *count += 1;
                        true
                    }
                    _ => false,
                },
            }
        }))
    }

    async fn set_typing(&self, room_id: &str, user_id: &str, ttl: u64) -> Result<()> {
        self.with_entries(|entries| {
            let entry = entries.entry(typing_key(room_id)).or_insert_with(|| Entry {
                value: Value::Set(HashSet::new()),
                expires_at: None,
            });
            if let Value::Set(set) = &mut entry.value {
                set.insert(user_id.to_string());
            }
            entry.expires_at = deadline(ttl);
        });
        Ok(())
    }

    async fn remove_typing(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.with_entries(|entries| {
            if let Some(Entry { value: Value::Set(set), .. }) = entries.get_mut(&typing_key(room_id))
            {
                set.remove(user_id);
            }
        });
        Ok(())
    }

    async fn typing_users(&self, room_id: &str) -> Result<Vec<String>> {
        Ok(self.with_entries(|entries| match entries.get(&typing_key(room_id)).map(|e| &e.value) {
            Some(Value::Set(set)) => set.iter().cloned().collect(),
            _ => Vec::new(),
        }))
    }

    async fn cache_room_members(&self, room_id: &str, member_ids: &[String]) -> Result<()> {
        self.with_entries(|entries| {
            entries.remove(&room_members_key(room_id));
            if !member_ids.is_empty() {
                entries.insert(
                    room_members_key(room_id),
                    Entry {
                        value: Value::Set(member_ids.iter().cloned().collect()),
                        expires_at: deadline(ROOM_MEMBERS_TTL),
                    },
                );
            }
        });
        Ok(())
    }

    async fn cached_room_members(&self, room_id: &str) -> Result<Option<Vec<String>>> {
        Ok(self.with_entries(|entries| {
            match entries.get(&room_members_key(room_id)).map(|e| &e.value) {
                Some(Value::Set(set)) => Some(set.iter().cloned().collect()),
                _ => None,
            }
        }))
    }
}
