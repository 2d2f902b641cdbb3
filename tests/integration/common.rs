use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use chat_hub::auth::AuthClaims;
use chat_hub::config::Config;
use chat_hub::ephemeral::MemoryStore;
use chat_hub::error::RepositoryError;
use chat_hub::handlers;
use chat_hub::hub::Hub;
use chat_hub::models::{
    Attachment, Message, NewAttachment, NewMessage, NewNotification, SenderProfile,
};
use chat_hub::protocol::parse_client_event;
use chat_hub::repository::Repository;

// --- In-memory repository ---

#[derive(Default)]
struct RepoState {
    members: HashMap<String, Vec<String>>,
    messages: HashMap<String, Message>,
    attachments: Vec<Attachment>,
    notifications: Vec<NewNotification>,
    profiles: HashMap<String, SenderProfile>,
    profile_status: HashMap<String, String>,
}

/// Repository double with the same verdict semantics as the Supabase
/// adapter: ownership mismatches and deleted rows yield `None`, not errors.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<RepoState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_room(&self, room_id: &str, members: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state
            .members
            .insert(room_id.to_string(), members.iter().map(|m| m.to_string()).collect());
    }

    pub fn add_profile(&self, user_id: &str, username: &str, display_name: &str) {
        let mut state = self.state.lock().unwrap();
        state.profiles.insert(
            user_id.to_string(),
            SenderProfile {
                username: Some(username.to_string()),
                display_name: Some(display_name.to_string()),
                avatar_url: None,
            },
        );
    }

    pub fn message(&self, message_id: &str) -> Option<Message> {
        self.state.lock().unwrap().messages.get(message_id).cloned()
    }

    pub fn notifications_for(&self, user_id: &str) -> Vec<NewNotification> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn profile_status(&self, user_id: &str) -> Option<String> {
        self.state.lock().unwrap().profile_status.get(user_id).cloned()
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .members
            .get(room_id)
            .is_some_and(|members| members.iter().any(|m| m == user_id)))
    }

    async fn list_room_members(&self, room_id: &str) -> Result<Vec<String>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.members.get(room_id).cloned().unwrap_or_default())
    }

    async fn insert_message(&self, fields: NewMessage) -> Result<Message, RepositoryError> {
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: fields.room_id,
            sender_id: fields.sender_id,
            content: fields.content,
            message_type: fields.message_type,
            reply_to: fields.reply_to,
            is_edited: false,
            is_deleted: false,
            created_at: now(),
            updated_at: now(),
            sender_username: None,
            sender_display_name: None,
            sender_avatar: None,
            attachment: None,
        };
        let mut state = self.state.lock().unwrap();
        state.messages.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn insert_attachment(
        &self,
        message_id: &str,
        fields: NewAttachment,
    ) -> Result<Attachment, RepositoryError> {
        let attachment = Attachment {
            id: Some(uuid::Uuid::new_v4().to_string()),
            message_id: message_id.to_string(),
            file_name: fields.file_name,
            file_type: fields.file_type,
            file_size: fields.file_size,
            storage_path: fields.storage_path,
            mime_type: fields.mime_type,
            thumbnail_path: fields.thumbnail_path,
            width: fields.width,
            height: fields.height,
            duration: fields.duration,
        };
        let mut state = self.state.lock().unwrap();
        state.attachments.push(attachment.clone());
        Ok(attachment)
    }

    async fn update_message_content(
        &self,
        message_id: &str,
        sender_id: &str,
        new_content: &str,
    ) -> Result<Option<Message>, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let Some(message) = state.messages.get_mut(message_id) else {
            return Ok(None);
        };
        if message.sender_id != sender_id || message.is_deleted {
            return Ok(None);
        }
        message.content = Some(new_content.to_string());
        message.is_edited = true;
        message.updated_at = now();
        Ok(Some(message.clone()))
    }

    async fn soft_delete_message(
        &self,
        message_id: &str,
        sender_id: &str,
    ) -> Result<Option<String>, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let Some(message) = state.messages.get_mut(message_id) else {
            return Ok(None);
        };
        if message.sender_id != sender_id || message.is_deleted {
            return Ok(None);
        }
        message.is_deleted = true;
        message.content = None;
        message.updated_at = now();
        Ok(Some(message.room_id.clone()))
    }

    async fn fetch_sender_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<SenderProfile>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.profiles.get(user_id).cloned())
    }

    async fn insert_notification(&self, fields: NewNotification) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.notifications.push(fields);
        Ok(())
    }

    async fn update_profile_status(
        &self,
        user_id: &str,
        status: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.profile_status.insert(user_id.to_string(), status.to_string());
        Ok(())
    }

    async fn fetch_profile_status(&self, user_id: &str) -> Result<Option<String>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.profile_status.get(user_id).cloned())
    }
}

// --- Hub harness ---

pub struct TestContext {
    pub hub: Arc<Hub>,
    pub repo: Arc<MemoryRepository>,
}

pub fn test_hub() -> TestContext {
    test_hub_with(|_| {})
}

pub fn test_hub_with(tweak: impl FnOnce(&mut Config)) -> TestContext {
    let mut config = Config::for_tests();
    tweak(&mut config);
    let repo = Arc::new(MemoryRepository::new());
    let hub = Arc::new(Hub::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::clone(&repo) as Arc<dyn Repository>,
    ));
    TestContext { hub, repo }
}

/// Register an authenticated connection, as the socket task does after a
/// successful handshake. Returns the connection's outbound frame stream.
pub async fn connect(hub: &Hub, user_id: &str, connection_id: &str) -> UnboundedReceiver<String> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let claims = AuthClaims {
        user_id: user_id.to_string(),
        email: None,
        role: None,
        raw: serde_json::json!({ "sub": user_id, "role": "authenticated" }),
    };
    handlers::register_connection(hub, connection_id, tx, &claims).await;
    rx
}

/// Feed one raw text frame through the same parse/dispatch path as the
/// socket read loop.
pub async fn send_raw(hub: &Hub, connection_id: &str, text: &str) {
    match parse_client_event(text) {
        Ok(event) => handlers::dispatch(hub, connection_id, event).await,
        Err(e) => handlers::emit_error(hub, connection_id, &e.client_message()),
    }
}

pub async fn send_event(hub: &Hub, connection_id: &str, event: serde_json::Value) {
    send_raw(hub, connection_id, &event.to_string()).await;
}

/// Everything the connection has received so far, parsed.
pub fn frames(rx: &mut UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut received = Vec::new();
    while let Ok(text) = rx.try_recv() {
        received.push(serde_json::from_str(&text).unwrap());
    }
    received
}

/// Payloads of the frames carrying the given event name.
pub fn payloads(frames: &[serde_json::Value], event: &str) -> Vec<serde_json::Value> {
    frames
        .iter()
        .filter(|f| f["event"] == event)
        .map(|f| f["data"].clone())
        .collect()
}
