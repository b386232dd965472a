#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use matcha_social::chat::ChatBounds;
use matcha_social::discovery::LimitBounds;
use matcha_social::engine::{EngineSettings, SocialEngine};
use matcha_social::models::Profile;
use matcha_social::realtime::{ConnectionId, Outbound, PublishOutcome, RealtimeMessage, RoomHub};
use matcha_social::store::MemoryStore;

pub const ACK_TIMEOUT: Duration = Duration::from_millis(300);

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub hub: Arc<RoomHub>,
    pub engine: Arc<SocialEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(RoomHub::new(ACK_TIMEOUT));
        let settings = EngineSettings {
            push_ack_timeout: ACK_TIMEOUT,
            chat: ChatBounds::default(),
            discovery: LimitBounds::default(),
        };
        let engine = Arc::new(SocialEngine::new(store.clone(), hub.clone(), settings));
        Self { store, hub, engine }
    }

    /// Insert a profile built by `profile` and return its id.
    pub fn add(&self, profile: Profile) -> Uuid {
        let id = profile.id;
        self.store.insert_profile(profile);
        id
    }

    pub fn fame(&self, id: Uuid) -> i32 {
        use matcha_social::store::RelationshipStore;
        self.store.get_profile(id).unwrap().unwrap().fame_rating
    }

    pub fn connect(&self, user: Uuid) -> TestClient {
        let connection: ConnectionId = format!("conn-{}", Uuid::new_v4());
        let session = self.engine.on_connect(user, &connection);
        TestClient {
            user,
            connection,
            outbound: session.outbound,
            replay: Some(session.replay),
        }
    }
}

pub fn profile(username: &str) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        username: username.into(),
        email: format!("{username}@example.com"),
        first_name: username.into(),
        last_name: "Tester".into(),
        gender: "female".into(),
        sexual_preference: "male".into(),
        age: 25,
        biography: None,
        fame_rating: 0,
        latitude: Some(48.8566),
        longitude: Some(2.3522),
        interests: Vec::new(),
        last_seen_at: None,
    }
}

/// Scripted stand-in for a Socket.IO client: drains the connection queue and
/// answers acknowledgments on demand.
pub struct TestClient {
    pub user: Uuid,
    pub connection: ConnectionId,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    replay: Option<JoinHandle<Vec<PublishOutcome>>>,
}

impl TestClient {
    pub async fn recv(&mut self) -> Outbound {
        tokio::time::timeout(Duration::from_secs(2), self.outbound.recv())
            .await
            .expect("timed out waiting for an outbound message")
            .expect("connection queue closed")
    }

    /// Next message, acknowledging it if it asks for one.
    pub async fn recv_acked(&mut self) -> RealtimeMessage {
        let Outbound { message, ack } = self.recv().await;
        if let Some(ack) = ack {
            ack.report(true);
        }
        message
    }

    /// Next message with the given event name, acknowledging everything on the way.
    pub async fn expect_event(&mut self, event: &str) -> RealtimeMessage {
        loop {
            let message = self.recv_acked().await;
            if message.event == event {
                return message;
            }
        }
    }

    pub async fn assert_silent(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(100), self.outbound.recv()).await;
        assert!(next.is_err(), "unexpected message: {:?}", next.ok().flatten().map(|o| o.message));
    }

    pub async fn replay_outcomes(&mut self) -> Vec<PublishOutcome> {
        self.replay.take().expect("replay already awaited").await.unwrap()
    }

    pub fn disconnect(self, engine: &SocialEngine) {
        engine.on_disconnect(self.user, &self.connection);
    }
}

/// Poll `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
