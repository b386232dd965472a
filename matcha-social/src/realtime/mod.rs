//! Per-user rooms addressed by identity.

mod hub;

pub use hub::RoomHub;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Transport-level connection handle (the socket id for Socket.IO).
pub type ConnectionId = String;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Room(String);

impl Room {
    pub fn user(id: Uuid) -> Self {
        Room(format!("user:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RealtimeMessage {
    pub event: String,
    pub payload: serde_json::Value,
}

impl RealtimeMessage {
    pub fn new(event: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            event: event.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// One reply slot per acknowledged emit. Dropping it unanswered counts as a
/// negative acknowledgment.
#[derive(Debug)]
pub struct Ack(oneshot::Sender<bool>);

impl Ack {
    pub fn pair() -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        (Ack(tx), rx)
    }

    pub fn report(self, acknowledged: bool) {
        let _ = self.0.send(acknowledged);
    }
}

/// What a transport adapter drains from a connection's queue.
#[derive(Debug)]
pub struct Outbound {
    pub message: RealtimeMessage,
    pub ack: Option<Ack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Acknowledged,
    NoConnection,
    TimedOut,
    Rejected,
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishOutcome::Acknowledged => "acknowledged",
            PublishOutcome::NoConnection => "no_connection",
            PublishOutcome::TimedOut => "timed_out",
            PublishOutcome::Rejected => "rejected",
        }
    }
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Register a connection and hand back the queue its transport drains.
    fn attach(&self, connection: &ConnectionId) -> mpsc::UnboundedReceiver<Outbound>;

    /// Drop the connection and every room membership it holds.
    fn detach(&self, connection: &ConnectionId);

    fn join(&self, connection: &ConnectionId, room: &Room);

    fn leave(&self, connection: &ConnectionId, room: &Room);

    /// Deliver to every connection in the room and wait for the first
    /// positive acknowledgment.
    async fn publish(&self, room: &Room, message: RealtimeMessage) -> PublishOutcome;

    /// Fire-and-forget to the room; returns how many connections were reached.
    fn emit(&self, room: &Room, message: RealtimeMessage) -> usize;

    /// Fire-and-forget to a single connection.
    fn emit_to(&self, connection: &ConnectionId, message: RealtimeMessage) -> bool;

    fn is_online(&self, user: Uuid) -> bool;
}
