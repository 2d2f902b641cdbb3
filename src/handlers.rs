//! Event handlers: the state machine between the wire protocol and the hub
//! services. A connection is unauthenticated until `register_connection`,
//! authenticated until `disconnect_connection`. Handler errors become an
//! `error` event to the originating socket; only authentication failures
//! close the connection.

use crate::auth::{self, AuthClaims};
use crate::ephemeral::{EphemeralStore, SESSION_TTL};
use crate::repository::Repository;
use crate::error::HubError;
use crate::hub::Hub;
use crate::models::{Message, NewAttachment, PresenceStatus};
use crate::protocol::{
    ClientEvent, DeleteMessagePayload, EditMessagePayload, FileUploadedPayload, RoomRef,
    SendMessagePayload, UpdateStatusPayload,
};
use crate::transport::FrameSender;

/// Verify the handshake token. The specific cause is logged; callers only
/// learn "unauthorized".
pub fn authenticate(hub: &Hub, token: &str) -> Result<AuthClaims, HubError> {
    auth::verify_token(token, &hub.config.supabase_jwt_secret).map_err(|e| {
        eprintln!("JWT validation error: {e}");
        HubError::Unauthorized
    })
}

/// `UNAUTH → AUTH`: wire up the transport, attach the session in-process and
/// in the ephemeral mirror, mark online, drain the offline queue to this
/// socket only, and tell peers.
pub async fn register_connection(
    hub: &Hub,
    connection_id: &str,
    sender: FrameSender,
    claims: &AuthClaims,
) {
    let user_id = &claims.user_id;

    hub.transport.register(connection_id, sender);
    hub.registry.attach(user_id, connection_id);

    if let Err(e) = hub
        .ephemeral
        .set_user_session(user_id, connection_id, &claims.raw, SESSION_TTL)
        .await
    {
        eprintln!("session mirror write for {user_id} failed: {e}");
    }
    if let Err(e) = hub.presence.set_online(user_id, PresenceStatus::Online).await {
        eprintln!("presence write for {user_id} failed: {e}");
    }

    hub.fanout
        .drain_offline_queue(&hub.transport, user_id, connection_id)
        .await;

    hub.transport.broadcast_all(
        "user_online",
        &serde_json::json!({ "user_id": user_id }),
        Some(connection_id),
    );

    println!("User connected: {user_id} ({connection_id})");
}

/// `AUTH → CLOSED`: tear down the session; the offline transition and
/// broadcast happen only when the user's last connection is gone.
pub async fn disconnect_connection(hub: &Hub, connection_id: &str) {
    hub.transport.unregister(connection_id);

    let Some(detached) = hub.registry.detach(connection_id) else {
        return;
    };
    let user_id = detached.user_id;

    if let Err(e) = hub.ephemeral.delete_user_session(&user_id, connection_id).await {
        eprintln!("session mirror delete for {user_id} failed: {e}");
    }

    if detached.fully_departed {
        if let Err(e) = hub.presence.set_offline(&user_id).await {
            eprintln!("presence delete for {user_id} failed: {e}");
        }
        hub.transport
            .broadcast_all("user_offline", &serde_json::json!({ "user_id": user_id }), None);
        println!("User offline: {user_id}");
    }
}

/// Route one inbound event from an authenticated connection. Never closes
/// the connection; failures are reported back to the sender.
pub async fn dispatch(hub: &Hub, connection_id: &str, event: ClientEvent) {
    let Some(user_id) = hub.registry.user_of(connection_id) else {
        emit_error(hub, connection_id, "Unauthorized");
        return;
    };

    let result = match event {
        ClientEvent::Auth(_) => Err(HubError::Validation("already authenticated".to_string())),
        ClientEvent::JoinRoom(payload) => join_room(hub, &user_id, connection_id, payload).await,
        ClientEvent::LeaveRoom(payload) => leave_room(hub, &user_id, connection_id, payload).await,
        ClientEvent::SendMessage(payload) => {
            send_message(hub, &user_id, connection_id, payload).await
        }
        ClientEvent::EditMessage(payload) => edit_message(hub, &user_id, payload).await,
        ClientEvent::DeleteMessage(payload) => delete_message(hub, &user_id, payload).await,
        ClientEvent::TypingStart(payload) => {
            typing_start(hub, &user_id, connection_id, payload).await
        }
        ClientEvent::TypingStop(payload) => typing_stop(hub, &user_id, connection_id, payload).await,
        ClientEvent::UpdateStatus(payload) => {
            update_status(hub, &user_id, connection_id, payload).await
        }
        ClientEvent::FileUploaded(payload) => file_uploaded(hub, &user_id, payload).await,
    };

    if let Err(e) = result {
        if matches!(e, HubError::Repository(_) | HubError::Ephemeral(_)) {
            eprintln!("handler error for {user_id}: {e}");
        }
        emit_error(hub, connection_id, &e.client_message());
    }
}

/// Report a handler failure to the originating socket only.
pub fn emit_error(hub: &Hub, connection_id: &str, message: &str) {
    hub.transport
        .emit_to(connection_id, "error", &serde_json::json!({ "message": message }));
}

async fn join_room(
    hub: &Hub,
    user_id: &str,
    connection_id: &str,
    payload: RoomRef,
) -> Result<(), HubError> {
    let room_id = &payload.room_id;
    if !check_room_membership(hub, user_id, room_id).await? {
        return Err(HubError::Forbidden("Not a member of this room".to_string()));
    }

    hub.transport.join_room(room_id, connection_id);

    hub.transport.broadcast_room(
        room_id,
        "user_joined_room",
        &serde_json::json!({ "user_id": user_id, "room_id": room_id }),
        Some(connection_id),
    );
    // Confirmation goes to the joining socket only.
    hub.transport
        .emit_to(connection_id, "room_joined", &serde_json::json!({ "room_id": room_id }));

    println!("User {user_id} joined room {room_id}");
    Ok(())
}

async fn leave_room(
    hub: &Hub,
    user_id: &str,
    connection_id: &str,
    payload: RoomRef,
) -> Result<(), HubError> {
    let room_id = &payload.room_id;
    hub.transport.leave_room(room_id, connection_id);

    hub.transport.broadcast_room(
        room_id,
        "user_left_room",
        &serde_json::json!({ "user_id": user_id, "room_id": room_id }),
        None,
    );

    println!("User {user_id} left room {room_id}");
    Ok(())
}

async fn send_message(
    hub: &Hub,
    user_id: &str,
    _connection_id: &str,
    payload: SendMessagePayload,
) -> Result<(), HubError> {
    if !hub.rate_limiter.allow(user_id).await? {
        return Err(HubError::RateLimited);
    }
    if !check_room_membership(hub, user_id, &payload.room_id).await? {
        return Err(HubError::Forbidden("Not a member".to_string()));
    }

    // Awaiting the insert before emitting keeps per-sender room order
    // aligned with the repository's insert order.
    let message = hub
        .messages
        .create(
            &payload.room_id,
            user_id,
            payload.content,
            &payload.message_type,
            payload.reply_to,
        )
        .await
        .map_err(|e| {
            eprintln!("message insert failed: {e}");
            HubError::Failed("Failed to save message".to_string())
        })?;

    broadcast_message(hub, &payload.room_id, "message", &message);
    hub.fanout
        .notify_offline_members(&payload.room_id, user_id, &message)
        .await;

    println!("Message sent in room {} by {user_id}", payload.room_id);
    Ok(())
}

async fn edit_message(hub: &Hub, user_id: &str, payload: EditMessagePayload) -> Result<(), HubError> {
    let updated = hub
        .messages
        .edit(&payload.message_id, user_id, &payload.content)
        .await
        .map_err(|e| {
            eprintln!("message edit failed: {e}");
            HubError::Failed("Failed to edit".to_string())
        })?
        .ok_or_else(|| HubError::Forbidden("Failed to edit".to_string()))?;

    broadcast_message(hub, &updated.room_id, "message_edited", &updated);
    println!("Message {} edited", payload.message_id);
    Ok(())
}

async fn delete_message(
    hub: &Hub,
    user_id: &str,
    payload: DeleteMessagePayload,
) -> Result<(), HubError> {
    let room_id = hub
        .messages
        .delete(&payload.message_id, user_id)
        .await
        .map_err(|e| {
            eprintln!("message delete failed: {e}");
            HubError::Failed("Failed to delete".to_string())
        })?
        .ok_or_else(|| HubError::Forbidden("Failed to delete".to_string()))?;

    hub.transport.broadcast_room(
        &room_id,
        "message_deleted",
        &serde_json::json!({ "message_id": payload.message_id, "room_id": room_id }),
        None,
    );
    println!("Message {} deleted", payload.message_id);
    Ok(())
}

async fn typing_start(
    hub: &Hub,
    user_id: &str,
    connection_id: &str,
    payload: RoomRef,
) -> Result<(), HubError> {
    hub.ephemeral
        .set_typing(&payload.room_id, user_id, hub.config.typing_timeout)
        .await?;

    hub.transport.broadcast_room(
        &payload.room_id,
        "user_typing",
        &serde_json::json!({ "user_id": user_id, "room_id": payload.room_id }),
        Some(connection_id),
    );
    Ok(())
}

async fn typing_stop(
    hub: &Hub,
    user_id: &str,
    connection_id: &str,
    payload: RoomRef,
) -> Result<(), HubError> {
    hub.ephemeral.remove_typing(&payload.room_id, user_id).await?;

    hub.transport.broadcast_room(
        &payload.room_id,
        "user_stopped_typing",
        &serde_json::json!({ "user_id": user_id, "room_id": payload.room_id }),
        Some(connection_id),
    );
    Ok(())
}

async fn update_status(
    hub: &Hub,
    user_id: &str,
    connection_id: &str,
    payload: UpdateStatusPayload,
) -> Result<(), HubError> {
    let status = PresenceStatus::parse(&payload.status)
        .ok_or_else(|| HubError::Validation("Invalid status".to_string()))?;

    hub.presence.update_status(user_id, status).await?;

    hub.transport.broadcast_all(
        "user_status_changed",
        &serde_json::json!({ "user_id": user_id, "status": status.as_str() }),
        Some(connection_id),
    );

    println!("User {user_id} status: {status}");
    Ok(())
}

async fn file_uploaded(
    hub: &Hub,
    user_id: &str,
    payload: FileUploadedPayload,
) -> Result<(), HubError> {
    let message = hub
        .messages
        .create_with_attachment(
            &payload.room_id,
            user_id,
            NewAttachment {
                file_name: payload.file_name,
                file_type: payload.file_type,
                file_size: payload.file_size,
                storage_path: payload.storage_path,
                mime_type: payload.mime_type,
                thumbnail_path: payload.thumbnail_path,
                width: payload.width,
                height: payload.height,
                duration: payload.duration,
            },
        )
        .await
        .map_err(|e| {
            eprintln!("attachment message insert failed: {e}");
            HubError::Failed("Failed to save message".to_string())
        })?;

    broadcast_message(hub, &payload.room_id, "message", &message);
    hub.fanout
        .notify_offline_members(&payload.room_id, user_id, &message)
        .await;

    println!("File uploaded in room {}", payload.room_id);
    Ok(())
}

fn broadcast_message(hub: &Hub, room_id: &str, event: &str, message: &Message) {
    match serde_json::to_value(message) {
        Ok(payload) => hub.transport.broadcast_room(room_id, event, &payload, None),
        Err(e) => eprintln!("serializing message {} failed: {e}", message.id),
    }
}

/// Membership with the advisory cache in front of the repository. A cached
/// hit grants; a miss or a cached set without the user falls through to the
/// repository, whose positive verdict rebuilds the cache.
async fn check_room_membership(hub: &Hub, user_id: &str, room_id: &str) -> Result<bool, HubError> {
    match hub.ephemeral.cached_room_members(room_id).await {
        Ok(Some(members)) if members.iter().any(|m| m == user_id) => return Ok(true),
        Ok(_) => {}
        Err(e) => eprintln!("membership cache read for {room_id} failed: {e}"),
    }

    let is_member = hub.repo.is_member(room_id, user_id).await?;
    if is_member {
        match hub.repo.list_room_members(room_id).await {
            Ok(members) => {
                if let Err(e) = hub.ephemeral.cache_room_members(room_id, &members).await {
                    eprintln!("membership cache write for {room_id} failed: {e}");
                }
            }
            Err(e) => eprintln!("membership cache rebuild for {room_id} failed: {e}"),
        }
    }
    Ok(is_member)
}
