mod common;

use common::{eventually, profile, Harness};
use matcha_shared::types::pagination::PaginationParams;
use matcha_shared::ErrorCode;
use matcha_social::models::{DeliveryStatus, EntityType};
use matcha_social::realtime::PublishOutcome;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn pending_notifications_replay_in_creation_order() {
    let h = Harness::new();
    let bob = h.add(profile("bob"));
    let actors: Vec<Uuid> = ["ann", "cat", "dan"].iter().map(|n| h.add(profile(n))).collect();

    for actor in &actors {
        let fan_out = h
            .engine
            .notifications()
            .create_and_send(EntityType::Like, Uuid::new_v4(), *actor, &[bob])
            .unwrap();
        assert_eq!(fan_out.settle().await, vec![PublishOutcome::NoConnection]);
    }
    assert!(h.store.deliveries().iter().all(|d| d.status == DeliveryStatus::Sent));

    let mut client = h.connect(bob);
    let greeting = client.recv_acked().await;
    assert_eq!(greeting.event, "connected");
    assert_eq!(greeting.payload["user_id"], bob.to_string());

    for actor in &actors {
        let pushed = client.recv_acked().await;
        assert_eq!(pushed.event, "notification");
        assert_eq!(pushed.payload["actor_id"], actor.to_string());
    }

    let outcomes = client.replay_outcomes().await;
    assert_eq!(outcomes, vec![PublishOutcome::Acknowledged; 3]);
    assert!(h.store.deliveries().iter().all(|d| d.status == DeliveryStatus::Received));
}

#[tokio::test]
async fn events_after_connect_are_pushed_once() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));

    let offline = h
        .engine
        .notifications()
        .create_and_send(EntityType::ProfileView, Uuid::new_v4(), alice, &[bob])
        .unwrap();
    assert_eq!(offline.settle().await, vec![PublishOutcome::NoConnection]);

    // A new event lands before the replay task has had a chance to run.
    let mut client = h.connect(bob);
    h.engine.like(alice, bob).await.unwrap();

    assert_eq!(client.recv_acked().await.event, "connected");
    let mut kinds = Vec::new();
    for _ in 0..2 {
        let pushed = client.recv_acked().await;
        assert_eq!(pushed.event, "notification");
        kinds.push(pushed.payload["entity_type"].as_str().unwrap_or_default().to_string());
    }
    kinds.sort();
    assert_eq!(kinds, vec!["LIKE", "PROFILE_VIEW"]);
    client.assert_silent().await;

    assert_eq!(client.replay_outcomes().await, vec![PublishOutcome::Acknowledged]);
    let store = h.store.clone();
    eventually(move || store.deliveries().iter().all(|d| d.status == DeliveryStatus::Received)).await;
}

#[tokio::test]
async fn unacknowledged_pushes_stay_pending() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));

    let mut client = h.connect(bob);
    client.expect_event("connected").await;
    assert!(client.replay_outcomes().await.is_empty());

    // Dropping the ack slot is a negative acknowledgment.
    let fan_out = h
        .engine
        .notifications()
        .create_and_send(EntityType::ProfileView, Uuid::new_v4(), alice, &[bob])
        .unwrap();
    let dropped = client.recv().await;
    drop(dropped);
    assert_eq!(fan_out.settle().await, vec![PublishOutcome::Rejected]);

    // Holding it past the timeout is no answer at all.
    let fan_out = h
        .engine
        .notifications()
        .create_and_send(EntityType::ProfileView, Uuid::new_v4(), alice, &[bob])
        .unwrap();
    let _held = client.recv().await;
    assert_eq!(fan_out.settle().await, vec![PublishOutcome::TimedOut]);

    assert!(h.store.deliveries().iter().all(|d| d.status == DeliveryStatus::Sent));

    // Both come back on the next connection.
    client.disconnect(&h.engine);
    let mut again = h.connect(bob);
    again.expect_event("connected").await;
    again.recv_acked().await;
    again.recv_acked().await;
    assert_eq!(again.replay_outcomes().await, vec![PublishOutcome::Acknowledged; 2]);
}

#[tokio::test]
async fn fan_out_skips_the_sender_blocked_and_vanished_receivers() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));
    let carol = h.add(profile("carol"));
    let gone = h.add(profile("gone"));
    h.store.remove_profile(gone);
    h.engine.block(carol, alice).unwrap();

    let fan_out = h
        .engine
        .notifications()
        .create_and_send(EntityType::Message, Uuid::new_v4(), alice, &[alice, bob, bob, carol, gone])
        .unwrap();

    let notified: Vec<Uuid> = fan_out.event.deliveries.iter().map(|d| d.notifier_id).collect();
    assert_eq!(notified, vec![bob]);
    assert_eq!(fan_out.event.change.actor_id, alice);
    assert_eq!(h.store.notification_changes().len(), 1);
}

#[tokio::test]
async fn inbox_lists_counts_and_marks_read() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));
    let carol = h.add(profile("carol"));

    h.engine.like(alice, bob).await.unwrap();
    h.engine.record_visit(carol, bob).unwrap();
    h.engine.record_visit(alice, bob).unwrap();

    let page = h.engine.list_notifications(bob, &PaginationParams::default()).unwrap();
    assert_eq!(page.total, 3);
    let kinds: Vec<EntityType> = page.items.iter().map(|n| n.entity_type).collect();
    assert_eq!(kinds, vec![EntityType::ProfileView, EntityType::ProfileView, EntityType::Like]);
    assert_eq!(h.engine.unread_count(bob).unwrap(), 3);

    let newest = page.items[0].id;
    let read = h.engine.mark_read(bob, newest).unwrap();
    assert_eq!(read.status, DeliveryStatus::Read);
    assert_eq!(h.engine.unread_count(bob).unwrap(), 2);

    let err = h.engine.mark_read(alice, newest).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotificationNotFound);

    assert_eq!(h.engine.mark_all_read(bob).unwrap(), 2);
    assert_eq!(h.engine.unread_count(bob).unwrap(), 0);
    assert_eq!(h.engine.mark_all_read(bob).unwrap(), 0);
}

#[tokio::test]
async fn mark_read_over_the_socket() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));
    h.engine.like(alice, bob).await.unwrap();

    let mut client = h.connect(bob);
    client.expect_event("connected").await;
    let pushed = client.expect_event("notification").await;
    client.replay_outcomes().await;

    h.engine
        .on_mark_read(bob, &client.connection, json!({ "notification_id": pushed.payload["id"] }));
    assert_eq!(h.engine.unread_count(bob).unwrap(), 0);
    assert!(h.store.deliveries().iter().all(|d| d.status == DeliveryStatus::Read));

    h.engine.on_mark_read(bob, &client.connection, json!({ "notification_id": Uuid::new_v4() }));
    let error = client.expect_event("error").await;
    assert_eq!(error.payload["code"], "E4001");
}
