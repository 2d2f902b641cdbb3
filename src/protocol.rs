use serde::Deserialize;

use crate::error::HubError;

/// Inbound wire frame: `{"event": "<name>", "data": {...}}`. Each event is a
/// tagged variant with its required fields fixed; validation happens here at
/// the boundary, before anything reaches a handler.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Auth(AuthPayload),
    JoinRoom(RoomRef),
    LeaveRoom(RoomRef),
    SendMessage(SendMessagePayload),
    EditMessage(EditMessagePayload),
    DeleteMessage(DeleteMessagePayload),
    TypingStart(RoomRef),
    TypingStop(RoomRef),
    UpdateStatus(UpdateStatusPayload),
    FileUploaded(FileUploadedPayload),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthPayload {
    pub token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoomRef {
    pub room_id: String,
}

fn default_message_type() -> String {
    "text".to_string()
}

fn default_file_type() -> String {
    "document".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SendMessagePayload {
    pub room_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub reply_to: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EditMessagePayload {
    pub message_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeleteMessagePayload {
    pub message_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpdateStatusPayload {
    pub status: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FileUploadedPayload {
    pub room_id: String,
    pub file_name: String,
    pub storage_path: String,
    pub file_size: i64,
    #[serde(default = "default_file_type")]
    pub file_type: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub thumbnail_path: Option<String>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub duration: Option<i64>,
}

/// Parse one inbound text frame. Unknown events and missing required fields
/// surface as validation errors; the connection stays open.
pub fn parse_client_event(text: &str) -> Result<ClientEvent, HubError> {
    serde_json::from_str(text).map_err(|e| HubError::Validation(format!("invalid event: {e}")))
}
