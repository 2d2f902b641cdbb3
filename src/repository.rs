//! Repository adapter: the narrow durable-store interface the hub consumes,
//! implemented against Supabase's REST surface (PostgREST) with the service
//! role key. Membership answers from here are authoritative; the ephemeral
//! membership cache is advisory only.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::RepositoryError;
use crate::models::{Attachment, Message, NewAttachment, NewMessage, NewNotification, SenderProfile};

type Result<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool>;
    async fn list_room_members(&self, room_id: &str) -> Result<Vec<String>>;

    async fn insert_message(&self, fields: NewMessage) -> Result<Message>;
    async fn insert_attachment(&self, message_id: &str, fields: NewAttachment) -> Result<Attachment>;
    /// Returns `None` when the message does not exist or the sender does not
    /// own it.
    async fn update_message_content(
        &self,
        message_id: &str,
        sender_id: &str,
        new_content: &str,
    ) -> Result<Option<Message>>;
    /// Soft delete. Returns the room id for fan-out, or `None` on an
    /// ownership mismatch.
    async fn soft_delete_message(&self, message_id: &str, sender_id: &str)
    -> Result<Option<String>>;

    async fn fetch_sender_profile(&self, user_id: &str) -> Result<Option<SenderProfile>>;
    async fn insert_notification(&self, fields: NewNotification) -> Result<()>;

    /// Durable mirror of a presence transition (`status` + `last_seen`).
    async fn update_profile_status(&self, user_id: &str, status: &str) -> Result<()>;
    async fn fetch_profile_status(&self, user_id: &str) -> Result<Option<String>>;
}

// --- Supabase implementation ---

pub struct SupabaseRepository {
    http: reqwest::Client,
    rest_base: String,
    service_key: String,
}

#[derive(Deserialize)]
struct MemberRow {
    user_id: String,
}

#[derive(Deserialize)]
struct RoomIdRow {
    room_id: String,
}

#[derive(Deserialize)]
struct StatusRow {
    status: Option<String>,
}

impl SupabaseRepository {
    pub fn new(supabase_url: &str, service_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(SupabaseRepository {
            http,
            rest_base: format!("{}/rest/v1", supabase_url.trim_end_matches('/')),
            service_key: service_key.to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.rest_base, table))
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    /// Run a request expecting a JSON array of rows back.
    async fn rows<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<Vec<T>> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RepositoryError::Status { operation, status });
        }
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| RepositoryError::BadBody { operation, detail: e.to_string() })
    }

    /// Like `rows`, but the operation must return exactly one row.
    async fn one<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T> {
        self.rows::<T>(operation, builder)
            .await?
            .into_iter()
            .next()
            .ok_or(RepositoryError::BadBody { operation, detail: "empty result".to_string() })
    }
}

#[async_trait]
impl Repository for SupabaseRepository {
    async fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool> {
        let rows: Vec<MemberRow> = self
            .rows(
                "check membership",
                self.request(reqwest::Method::GET, "room_members").query(&[
                    ("select", "user_id".to_string()),
                    ("room_id", format!("eq.{room_id}")),
                    ("user_id", format!("eq.{user_id}")),
                ]),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_room_members(&self, room_id: &str) -> Result<Vec<String>> {
        let rows: Vec<MemberRow> = self
            .rows(
                "list room members",
                self.request(reqwest::Method::GET, "room_members").query(&[
                    ("select", "user_id".to_string()),
                    ("room_id", format!("eq.{room_id}")),
                ]),
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.user_id).collect())
    }

    async fn insert_message(&self, fields: NewMessage) -> Result<Message> {
        self.one(
            "insert message",
            self.request(reqwest::Method::POST, "messages")
                .header("Prefer", "return=representation")
                .json(&fields),
        )
        .await
    }

    async fn insert_attachment(
        &self,
        message_id: &str,
        fields: NewAttachment,
    ) -> Result<Attachment> {
        let mut body = serde_json::to_value(&fields)
            .map_err(|e| RepositoryError::BadBody { operation: "insert attachment", detail: e.to_string() })?;
        body["message_id"] = serde_json::Value::String(message_id.to_string());
        self.one(
            "insert attachment",
            self.request(reqwest::Method::POST, "message_attachments")
                .header("Prefer", "return=representation")
                .json(&body),
        )
        .await
    }

    async fn update_message_content(
        &self,
        message_id: &str,
        sender_id: &str,
        new_content: &str,
    ) -> Result<Option<Message>> {
        // Ownership check first: a mismatch is a verdict, not an error.
        // Deleted rows are excluded, so delete is absorbing.
        let owned: Vec<RoomIdRow> = self
            .rows(
                "check message ownership",
                self.request(reqwest::Method::GET, "messages").query(&[
                    ("select", "room_id".to_string()),
                    ("id", format!("eq.{message_id}")),
                    ("sender_id", format!("eq.{sender_id}")),
                    ("is_deleted", "eq.false".to_string()),
                ]),
            )
            .await?;
        if owned.is_empty() {
            return Ok(None);
        }

        let updated: Vec<Message> = self
            .rows(
                "edit message",
                self.request(reqwest::Method::PATCH, "messages")
                    .query(&[("id", format!("eq.{message_id}"))])
                    .header("Prefer", "return=representation")
                    .json(&serde_json::json!({
                        "content": new_content,
                        "is_edited": true,
                        "updated_at": chrono::Utc::now().to_rfc3339(),
                    })),
            )
            .await?;
        Ok(updated.into_iter().next())
    }

    async fn soft_delete_message(
        &self,
        message_id: &str,
        sender_id: &str,
    ) -> Result<Option<String>> {
        let owned: Vec<RoomIdRow> = self
            .rows(
                "check message ownership",
                self.request(reqwest::Method::GET, "messages").query(&[
                    ("select", "room_id".to_string()),
                    ("id", format!("eq.{message_id}")),
                    ("sender_id", format!("eq.{sender_id}")),
                    ("is_deleted", "eq.false".to_string()),
                ]),
            )
            .await?;
        let Some(row) = owned.into_iter().next() else {
            return Ok(None);
        };

        let _: Vec<serde_json::Value> = self
            .rows(
                "delete message",
                self.request(reqwest::Method::PATCH, "messages")
                    .query(&[("id", format!("eq.{message_id}"))])
                    .header("Prefer", "return=representation")
                    .json(&serde_json::json!({
                        "is_deleted": true,
                        "content": null,
                        "updated_at": chrono::Utc::now().to_rfc3339(),
                    })),
            )
            .await?;
        Ok(Some(row.room_id))
    }

    async fn fetch_sender_profile(&self, user_id: &str) -> Result<Option<SenderProfile>> {
        let rows: Vec<SenderProfile> = self
            .rows(
                "fetch sender profile",
                self.request(reqwest::Method::GET, "profiles").query(&[
                    ("select", "username,display_name,avatar_url".to_string()),
                    ("id", format!("eq.{user_id}")),
                ]),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_notification(&self, fields: NewNotification) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, "notifications")
            .header("Prefer", "return=minimal")
            .json(&fields)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RepositoryError::Status { operation: "insert notification", status });
        }
        Ok(())
    }

    async fn update_profile_status(&self, user_id: &str, status: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::PATCH, "profiles")
            .query(&[("id", format!("eq.{user_id}"))])
            .json(&serde_json::json!({
                "status": status,
                "last_seen": chrono::Utc::now().to_rfc3339(),
            }))
            .send()
            .await?;
        let http_status = response.status();
        if !http_status.is_success() {
            return Err(RepositoryError::Status {
                operation: "update profile status",
                status: http_status,
            });
        }
        Ok(())
    }

    async fn fetch_profile_status(&self, user_id: &str) -> Result<Option<String>> {
        let rows: Vec<StatusRow> = self
            .rows(
                "fetch profile status",
                self.request(reqwest::Method::GET, "profiles").query(&[
                    ("select", "status".to_string()),
                    ("id", format!("eq.{user_id}")),
                ]),
            )
            .await?;
        Ok(rows.into_iter().next().and_then(|r| r.status))
    }
}
