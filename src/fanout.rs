use std::sync::Arc;

use crate::ephemeral::EphemeralStore;
use crate::models::{Message, NewNotification};
use crate::repository::Repository;
use crate::transport::Transport;

/// Title of the notification row created for offline members.
const NEW_MESSAGE_TITLE: &str = "Nova mensagem";
/// Notification body for messages without text content.
const ATTACHMENT_PLACEHOLDER: &str = "Arquivo";

/// Offline-member detection, queueing, and notification emission for a newly
/// persisted message, plus the queue drain on handshake. Room broadcast
/// itself lives on `Transport`.
pub struct FanoutEngine {
    ephemeral: Arc<dyn EphemeralStore>,
    repo: Arc<dyn Repository>,
    queue_retention: u64,
}

impl FanoutEngine {
    pub fn new(
        ephemeral: Arc<dyn EphemeralStore>,
        repo: Arc<dyn Repository>,
        queue_retention: u64,
    ) -> Self {
        FanoutEngine { ephemeral, repo, queue_retention }
    }

    /// Queue the message and insert a notification for every room member
    /// without a live presence key. Membership comes from the repository:
    /// the cache is never consulted here. Per-member failures are logged and
    /// skipped; the persisted message stays authoritative.
    pub async fn notify_offline_members(&self, room_id: &str, sender_id: &str, message: &Message) {
        let members = match self.repo.list_room_members(room_id).await {
            Ok(members) => members,
            Err(e) => {
                eprintln!("offline fan-out: listing members of {room_id} failed: {e}");
                return;
            }
        };

        let envelope = match serde_json::to_string(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                eprintln!("offline fan-out: serializing message {} failed: {e}", message.id);
                return;
            }
        };

        for member in members.iter().filter(|m| *m != sender_id) {
            match self.ephemeral.is_user_online(member).await {
                Ok(true) => continue, // will receive via broadcast
                Ok(false) => {}
                Err(e) => {
                    eprintln!("offline fan-out: presence check for {member} failed: {e}");
                    continue;
                }
            }

            if let Err(e) = self
                .ephemeral
                .queue_message(member, &envelope, self.queue_retention)
                .await
            {
                eprintln!("offline fan-out: enqueue for {member} failed: {e}");
            }

            let body = message
                .content
                .clone()
                .unwrap_or_else(|| ATTACHMENT_PLACEHOLDER.to_string());
            if let Err(e) = self
                .repo
                .insert_notification(NewNotification {
                    user_id: member.clone(),
                    title: NEW_MESSAGE_TITLE.to_string(),
                    body: Some(body),
                    notification_type: "new_message".to_string(),
                    reference_id: Some(message.id.clone()),
                    is_read: false,
                })
                .await
            {
                eprintln!("offline fan-out: notification insert for {member} failed: {e}");
            }
        }
    }

    /// Fetch-all-then-delete the user's offline queue and replay each
    /// envelope as a `message` event to the newly connected socket only.
    pub async fn drain_offline_queue(
        &self,
        transport: &Transport,
        user_id: &str,
        connection_id: &str,
    ) {
        let envelopes = match self.ephemeral.drain_queued_messages(user_id).await {
            Ok(envelopes) => envelopes,
            Err(e) => {
                eprintln!("queue drain for {user_id} failed: {e}");
                return;
            }
        };
        if envelopes.is_empty() {
            return;
        }

        let count = envelopes.len();
        for envelope in envelopes {
            match serde_json::from_str::<serde_json::Value>(&envelope) {
                Ok(payload) => transport.emit_to(connection_id, "message", &payload),
                Err(e) => eprintln!("queue drain for {user_id}: bad envelope skipped: {e}"),
            }
        }
        println!("Delivered {count} queued messages to {user_id}");
    }
}
