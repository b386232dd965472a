mod common;

use common::{profile, Harness};
use matcha_shared::ErrorCode;
use matcha_social::models::EntityType;
use serde_json::json;

#[tokio::test]
async fn a_message_is_stored_pushed_and_notified() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));

    let mut bob_client = h.connect(bob);
    bob_client.expect_event("connected").await;

    let sent = h.engine.send_chat_message(alice, bob, "  hi <b>bob</b>  ").unwrap();
    assert_eq!(sent.body, "hi &lt;b&gt;bob&lt;/b&gt;");

    let stored = h.store.messages();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, sent.id);

    let objects = h.store.notification_objects();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].entity_type, EntityType::Message);
    assert_eq!(objects[0].entity_id, sent.id);
    let deliveries = h.store.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].notifier_id, bob);

    let pushed = bob_client.expect_event("chat-message").await;
    assert_eq!(pushed.payload["id"], sent.id.to_string());
    let notified = bob_client.expect_event("notification").await;
    assert_eq!(notified.payload["entity_type"], "MESSAGE");
}

#[tokio::test]
async fn a_blocked_pair_persists_nothing_and_only_the_sender_hears() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));
    h.engine.block(bob, alice).unwrap();

    let mut alice_client = h.connect(alice);
    let mut bob_client = h.connect(bob);
    alice_client.expect_event("connected").await;
    bob_client.expect_event("connected").await;

    let err = h
        .engine
        .on_chat_message(alice, &alice_client.connection, json!({ "receiver_id": bob, "message": "hello?" }))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MessagingNotAllowed);

    let signal = alice_client.expect_event("messaging-not-allowed").await;
    assert_eq!(signal.payload["receiver_id"], bob.to_string());

    assert!(h.store.messages().is_empty());
    assert!(h.store.notification_objects().is_empty());
    bob_client.assert_silent().await;

    let err = h.engine.send_chat_message(alice, bob, "hello?").unwrap_err();
    assert_eq!(err.code(), ErrorCode::MessagingNotAllowed);
}

#[tokio::test]
async fn socket_errors_are_reported_on_the_sending_connection() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));

    let mut alice_client = h.connect(alice);
    alice_client.expect_event("connected").await;

    let err = h
        .engine
        .on_chat_message(alice, &alice_client.connection, json!({ "receiver_id": bob, "message": "   " }))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MessageLength);
    let error = alice_client.expect_event("error").await;
    assert_eq!(error.payload["code"], "E3001");
    assert_eq!(error.payload["details"]["max"], 1000);

    let err = h
        .engine
        .on_chat_message(alice, &alice_client.connection, json!({ "to": "nobody" }))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    alice_client.expect_event("error").await;

    let long = "x".repeat(1001);
    let err = h.engine.send_chat_message(alice, bob, &long).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MessageLength);
    assert!(h.store.messages().is_empty());
}

#[tokio::test]
async fn history_pages_backwards_by_cursor() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));

    for i in 0..5 {
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        h.engine.send_chat_message(from, to, &format!("message {i}")).unwrap();
    }

    let first = h.engine.find_chat_history(alice, bob, None, 2).unwrap();
    let bodies: Vec<&str> = first.items.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["message 4", "message 3"]);
    let cursor = first.next_cursor.expect("more history");

    let second = h.engine.find_chat_history(bob, alice, Some(cursor), 2).unwrap();
    let bodies: Vec<&str> = second.items.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["message 2", "message 1"]);

    let last = h.engine.find_chat_history(alice, bob, second.next_cursor, 2).unwrap();
    assert_eq!(last.items.len(), 1);
    assert!(last.next_cursor.is_none());
}
