use std::sync::Arc;

use crate::error::RepositoryError;
use crate::models::{Message, NewAttachment, NewMessage};
use crate::repository::Repository;

/// Persists chat messages and enriches them with the sender's profile before
/// they go out on the wire. Ownership checks for edit/delete live in the
/// repository queries.
pub struct MessageService {
    repo: Arc<dyn Repository>,
}

impl MessageService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        MessageService { repo }
    }

    pub async fn create(
        &self,
        room_id: &str,
        sender_id: &str,
        content: Option<String>,
        message_type: &str,
        reply_to: Option<String>,
    ) -> Result<Message, RepositoryError> {
        let message = self
            .repo
            .insert_message(NewMessage {
                room_id: room_id.to_string(),
                sender_id: sender_id.to_string(),
                content,
                message_type: message_type.to_string(),
                reply_to,
            })
            .await?;
        self.enrich(message).await
    }

    /// Insert the message row (typed after the attachment), then the
    /// attachment row, then enrich. The message's content is empty; clients
    /// render the attachment.
    pub async fn create_with_attachment(
        &self,
        room_id: &str,
        sender_id: &str,
        attachment: NewAttachment,
    ) -> Result<Message, RepositoryError> {
        let message = self
            .repo
            .insert_message(NewMessage {
                room_id: room_id.to_string(),
                sender_id: sender_id.to_string(),
                content: None,
                message_type: attachment.file_type.clone(),
                reply_to: None,
            })
            .await?;
        let stored = self.repo.insert_attachment(&message.id, attachment).await?;
        let mut message = self.enrich(message).await?;
        message.attachment = Some(stored);
        Ok(message)
    }

    /// Only the sender may edit; an ownership mismatch yields `None`.
    pub async fn edit(
        &self,
        message_id: &str,
        sender_id: &str,
        new_content: &str,
    ) -> Result<Option<Message>, RepositoryError> {
        match self
            .repo
            .update_message_content(message_id, sender_id, new_content)
            .await?
        {
            Some(updated) => Ok(Some(self.enrich(updated).await?)),
            None => Ok(None),
        }
    }

    /// Soft delete: flags the row and clears the content. Returns the room
    /// id for fan-out, or `None` on an ownership mismatch.
    pub async fn delete(
        &self,
        message_id: &str,
        sender_id: &str,
    ) -> Result<Option<String>, RepositoryError> {
        self.repo.soft_delete_message(message_id, sender_id).await
    }

    async fn enrich(&self, mut message: Message) -> Result<Message, RepositoryError> {
        if let Some(profile) = self.repo.fetch_sender_profile(&message.sender_id).await? {
            message.sender_username = profile.username;
            message.sender_display_name = profile.display_name;
            message.sender_avatar = profile.avatar_url;
        }
        Ok(message)
    }
}
