mod common;

use common::{profile, Harness};
use matcha_shared::types::pagination::PaginationParams;
use matcha_shared::ErrorCode;
use matcha_social::models::EntityType;

#[tokio::test]
async fn visits_are_logged_and_notified() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));

    let visit = h.engine.record_visit(alice, bob).unwrap();
    assert_eq!(visit.visitor_id, alice);
    h.engine.record_visit(alice, bob).unwrap();

    let page = h.engine.list_visitors(bob, &PaginationParams::default()).unwrap();
    assert_eq!(page.total, 2);
    assert!(page.items.iter().all(|v| v.visitor_id == alice));

    let objects = h.store.notification_objects();
    assert_eq!(objects.len(), 2);
    assert!(objects.iter().all(|o| o.entity_type == EntityType::ProfileView));
}

#[tokio::test]
async fn blocked_or_self_visits_are_refused() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));

    assert_eq!(
        h.engine.record_visit(alice, alice).unwrap_err().code(),
        ErrorCode::CannotInteractWithSelf
    );

    h.engine.block(alice, bob).unwrap();
    assert_eq!(h.engine.record_visit(bob, alice).unwrap_err().code(), ErrorCode::NotPermitted);
    assert_eq!(h.engine.list_visitors(alice, &PaginationParams::default()).unwrap().total, 0);
}
