use crate::common::{connect, frames, payloads, send_event, test_hub, test_hub_with};
use chat_hub::ephemeral::EphemeralStore;

async fn joined(hub: &chat_hub::hub::Hub, connection_id: &str, room_id: &str) {
    send_event(
        hub,
        connection_id,
        serde_json::json!({"event": "join_room", "data": {"room_id": room_id}}),
    )
    .await;
}

// --- Send + fan-out ---

#[tokio::test]
async fn message_reaches_every_connection_in_the_room() {
    let ctx = test_hub();
    ctx.repo.add_room("r1", &["carol", "dan"]);

    // Carol is connected twice; both sockets joined the room.
    let mut carol_1 = connect(&ctx.hub, "carol", "c1").await;
    let mut carol_2 = connect(&ctx.hub, "carol", "c2").await;
    let mut dan = connect(&ctx.hub, "dan", "c3").await;
    joined(&ctx.hub, "c1", "r1").await;
    joined(&ctx.hub, "c2", "r1").await;
    joined(&ctx.hub, "c3", "r1").await;
    frames(&mut carol_1);
    frames(&mut carol_2);
    frames(&mut dan);

    send_event(
        &ctx.hub,
        "c3",
        serde_json::json!({"event": "send_message", "data": {"room_id": "r1", "content": "yo"}}),
    )
    .await;

    for rx in [&mut carol_1, &mut carol_2, &mut dan] {
        let received = payloads(&frames(rx), "message");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["content"], "yo");
        assert_eq!(received[0]["sender_id"], "dan");
        assert_eq!(received[0]["message_type"], "text");
    }
}

#[tokio::test]
async fn sender_profile_is_attached_on_emit() {
    let ctx = test_hub();
    ctx.repo.add_room("r1", &["eve"]);
    ctx.repo.add_profile("eve", "eve_v", "Eve Vega");

    let mut eve = connect(&ctx.hub, "eve", "c1").await;
    joined(&ctx.hub, "c1", "r1").await;
    frames(&mut eve);

    send_event(
        &ctx.hub,
        "c1",
        serde_json::json!({"event": "send_message", "data": {"room_id": "r1", "content": "hi"}}),
    )
    .await;

    let received = payloads(&frames(&mut eve), "message");
    assert_eq!(received[0]["sender_username"], "eve_v");
    assert_eq!(received[0]["sender_display_name"], "Eve Vega");
}

#[tokio::test]
async fn non_member_cannot_send() {
    let ctx = test_hub();
    ctx.repo.add_room("r1", &["bob"]);
    let mut mallory = connect(&ctx.hub, "mallory", "c1").await;

    send_event(
        &ctx.hub,
        "c1",
        serde_json::json!({"event": "send_message", "data": {"room_id": "r1", "content": "hi"}}),
    )
    .await;

    let errors = payloads(&frames(&mut mallory), "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "Not a member");
}

// --- Rate limiting ---

#[tokio::test]
async fn fourth_message_in_window_is_rate_limited() {
    let ctx = test_hub_with(|config| config.max_messages_per_minute = 3);
    ctx.repo.add_room("r1", &["bob", "peer"]);

    let mut bob = connect(&ctx.hub, "bob", "c-bob").await;
    let mut peer = connect(&ctx.hub, "peer", "c-peer").await;
    joined(&ctx.hub, "c-bob", "r1").await;
    joined(&ctx.hub, "c-peer", "r1").await;
    frames(&mut bob);
    frames(&mut peer);

    for _ in 0..4 {
        send_event(
            &ctx.hub,
            "c-bob",
            serde_json::json!({"event": "send_message", "data": {"room_id": "r1", "content": "hi"}}),
        )
        .await;
    }

    // Exactly three broadcasts; the fourth attempt failed to bob only.
    assert_eq!(payloads(&frames(&mut peer), "message").len(), 3);
    let bob_received = frames(&mut bob);
    assert_eq!(payloads(&bob_received, "message").len(), 3);
    let errors = payloads(&bob_received, "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "Rate limit exceeded");
}

// --- Offline members ---

#[tokio::test]
async fn offline_member_gets_queue_entry_and_notification() {
    let ctx = test_hub();
    ctx.repo.add_room("r1", &["eve", "frank"]);

    let mut eve = connect(&ctx.hub, "eve", "c1").await;
    joined(&ctx.hub, "c1", "r1").await;
    frames(&mut eve);

    send_event(
        &ctx.hub,
        "c1",
        serde_json::json!({"event": "send_message", "data": {"room_id": "r1", "content": "hello"}}),
    )
    .await;

    // Eve still receives her own broadcast.
    let received = payloads(&frames(&mut eve), "message");
    assert_eq!(received.len(), 1);
    let message_id = received[0]["id"].as_str().unwrap();

    // Frank's queue holds the envelope verbatim.
    let queued = ctx.hub.ephemeral.drain_queued_messages("frank").await.unwrap();
    assert_eq!(queued.len(), 1);
    let envelope: serde_json::Value = serde_json::from_str(&queued[0]).unwrap();
    assert_eq!(envelope["content"], "hello");
    assert_eq!(envelope["id"], message_id);

    // And a new_message notification row referencing the message.
    let notifications = ctx.repo.notifications_for("frank");
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].notification_type, "new_message");
    assert_eq!(notifications[0].title, "Nova mensagem");
    assert_eq!(notifications[0].body.as_deref(), Some("hello"));
    assert_eq!(notifications[0].reference_id.as_deref(), Some(message_id));

    // The sender never gets queued to herself.
    assert!(ctx.repo.notifications_for("eve").is_empty());
}

#[tokio::test]
async fn online_members_are_not_queued() {
    let ctx = test_hub();
    ctx.repo.add_room("r1", &["eve", "bob"]);

    let mut eve = connect(&ctx.hub, "eve", "c1").await;
    let _bob = connect(&ctx.hub, "bob", "c2").await;
    joined(&ctx.hub, "c1", "r1").await;
    frames(&mut eve);

    send_event(
        &ctx.hub,
        "c1",
        serde_json::json!({"event": "send_message", "data": {"room_id": "r1", "content": "hi"}}),
    )
    .await;

    assert!(ctx.hub.ephemeral.drain_queued_messages("bob").await.unwrap().is_empty());
    assert!(ctx.repo.notifications_for("bob").is_empty());
}

// --- Edit ---

#[tokio::test]
async fn only_the_sender_may_edit() {
    let ctx = test_hub();
    ctx.repo.add_room("r1", &["gina", "harry"]);

    let mut gina = connect(&ctx.hub, "gina", "c-gina").await;
    let mut harry = connect(&ctx.hub, "harry", "c-harry").await;
    joined(&ctx.hub, "c-gina", "r1").await;
    joined(&ctx.hub, "c-harry", "r1").await;
    frames(&mut gina);
    frames(&mut harry);

    send_event(
        &ctx.hub,
        "c-gina",
        serde_json::json!({"event": "send_message", "data": {"room_id": "r1", "content": "mine"}}),
    )
    .await;
    let message_id = payloads(&frames(&mut gina), "message")[0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    frames(&mut harry);

    send_event(
        &ctx.hub,
        "c-harry",
        serde_json::json!({"event": "edit_message", "data": {"message_id": message_id, "content": "gotcha"}}),
    )
    .await;

    let harry_received = frames(&mut harry);
    assert_eq!(payloads(&harry_received, "error").len(), 1);
    assert!(payloads(&harry_received, "message_edited").is_empty());
    assert!(payloads(&frames(&mut gina), "message_edited").is_empty());
    assert_eq!(
        ctx.repo.message(&message_id).unwrap().content.as_deref(),
        Some("mine")
    );
}

#[tokio::test]
async fn edit_broadcasts_to_the_messages_room() {
    let ctx = test_hub();
    ctx.repo.add_room("r1", &["gina", "harry"]);

    let mut gina = connect(&ctx.hub, "gina", "c-gina").await;
    let mut harry = connect(&ctx.hub, "harry", "c-harry").await;
    joined(&ctx.hub, "c-gina", "r1").await;
    joined(&ctx.hub, "c-harry", "r1").await;

    send_event(
        &ctx.hub,
        "c-gina",
        serde_json::json!({"event": "send_message", "data": {"room_id": "r1", "content": "v1"}}),
    )
    .await;
    let message_id = payloads(&frames(&mut gina), "message")[0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    frames(&mut harry);

    send_event(
        &ctx.hub,
        "c-gina",
        serde_json::json!({"event": "edit_message", "data": {"message_id": message_id, "content": "v2"}}),
    )
    .await;

    let edited = payloads(&frames(&mut harry), "message_edited");
    assert_eq!(edited.len(), 1);
    assert_eq!(edited[0]["content"], "v2");
    assert_eq!(edited[0]["is_edited"], true);

    let stored = ctx.repo.message(&message_id).unwrap();
    assert!(stored.is_edited);
    assert_eq!(stored.content.as_deref(), Some("v2"));
}

#[tokio::test]
async fn repeated_edit_with_same_content_changes_only_updated_at() {
    let ctx = test_hub();
    ctx.repo.add_room("r1", &["gina"]);
    let mut gina = connect(&ctx.hub, "gina", "c1").await;
    joined(&ctx.hub, "c1", "r1").await;

    send_event(
        &ctx.hub,
        "c1",
        serde_json::json!({"event": "send_message", "data": {"room_id": "r1", "content": "v1"}}),
    )
    .await;
    let message_id = payloads(&frames(&mut gina), "message")[0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let edit = serde_json::json!({"event": "edit_message", "data": {"message_id": message_id, "content": "vX"}});
    send_event(&ctx.hub, "c1", edit.clone()).await;
    let first = ctx.repo.message(&message_id).unwrap();
    send_event(&ctx.hub, "c1", edit).await;
    let second = ctx.repo.message(&message_id).unwrap();

    assert_eq!(first.content, second.content);
    assert_eq!(first.is_edited, second.is_edited);
    assert_eq!(first.created_at, second.created_at);
}

// --- Delete ---

#[tokio::test]
async fn delete_is_soft_and_absorbing() {
    let ctx = test_hub();
    ctx.repo.add_room("r1", &["gina", "harry"]);

    let mut gina = connect(&ctx.hub, "gina", "c-gina").await;
    let mut harry = connect(&ctx.hub, "harry", "c-harry").await;
    joined(&ctx.hub, "c-gina", "r1").await;
    joined(&ctx.hub, "c-harry", "r1").await;

    send_event(
        &ctx.hub,
        "c-gina",
        serde_json::json!({"event": "send_message", "data": {"room_id": "r1", "content": "bye"}}),
    )
    .await;
    let message_id = payloads(&frames(&mut gina), "message")[0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    frames(&mut harry);

    send_event(
        &ctx.hub,
        "c-gina",
        serde_json::json!({"event": "delete_message", "data": {"message_id": message_id}}),
    )
    .await;

    let deleted = payloads(&frames(&mut harry), "message_deleted");
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0]["message_id"], message_id.as_str());
    assert_eq!(deleted[0]["room_id"], "r1");

    let stored = ctx.repo.message(&message_id).unwrap();
    assert!(stored.is_deleted);
    assert!(stored.content.is_none());

    // Editing a deleted message is a no-op refusal.
    frames(&mut gina);
    send_event(
        &ctx.hub,
        "c-gina",
        serde_json::json!({"event": "edit_message", "data": {"message_id": message_id, "content": "haunt"}}),
    )
    .await;
    assert_eq!(payloads(&frames(&mut gina), "error").len(), 1);
    assert!(ctx.repo.message(&message_id).unwrap().content.is_none());
}

// --- File messages ---

#[tokio::test]
async fn file_upload_becomes_an_attachment_message() {
    let ctx = test_hub();
    ctx.repo.add_room("r1", &["eve", "frank"]);

    let mut eve = connect(&ctx.hub, "eve", "c1").await;
    joined(&ctx.hub, "c1", "r1").await;
    frames(&mut eve);

    send_event(
        &ctx.hub,
        "c1",
        serde_json::json!({"event": "file_uploaded", "data": {
            "room_id": "r1",
            "file_name": "sunset.jpg",
            "storage_path": "uploads/sunset.jpg",
            "file_size": 204800,
            "file_type": "image",
            "mime_type": "image/jpeg",
            "width": 1920,
            "height": 1080
        }}),
    )
    .await;

    let received = payloads(&frames(&mut eve), "message");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["message_type"], "image");
    assert!(received[0]["content"].is_null());
    assert_eq!(received[0]["attachment"]["file_name"], "sunset.jpg");
    assert_eq!(received[0]["attachment"]["width"], 1920);

    // Offline member gets the placeholder body, not message text.
    let notifications = ctx.repo.notifications_for("frank");
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].body.as_deref(), Some("Arquivo"));

    let queued = ctx.hub.ephemeral.drain_queued_messages("frank").await.unwrap();
    assert_eq!(queued.len(), 1);
    let envelope: serde_json::Value = serde_json::from_str(&queued[0]).unwrap();
    assert_eq!(envelope["attachment"]["storage_path"], "uploads/sunset.jpg");
}

#[tokio::test]
async fn file_upload_missing_fields_is_refused() {
    let ctx = test_hub();
    let mut eve = connect(&ctx.hub, "eve", "c1").await;

    send_event(
        &ctx.hub,
        "c1",
        serde_json::json!({"event": "file_uploaded", "data": {"room_id": "r1", "file_name": "a.txt"}}),
    )
    .await;

    assert_eq!(payloads(&frames(&mut eve), "error").len(), 1);
}
