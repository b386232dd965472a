use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::{Ack, Broker, ConnectionId, Outbound, PublishOutcome, RealtimeMessage, Room};

/// In-process broker: one unbounded queue per attached connection.
pub struct RoomHub {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>,
    rooms: DashMap<Room, HashSet<ConnectionId>>,
    ack_timeout: Duration,
}

impl RoomHub {
    pub fn new(ack_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            ack_timeout,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Senders for every live member of `room`; no map guard outlives this call.
    fn members(&self, room: &Room) -> Vec<mpsc::UnboundedSender<Outbound>> {
        let Some(ids) = self.rooms.get(room).map(|set| set.clone()) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.connections.get(id).map(|tx| tx.clone()))
            .collect()
    }
}

#[async_trait]
impl Broker for RoomHub {
    fn attach(&self, connection: &ConnectionId) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(connection.clone(), tx);
        rx
    }

    fn detach(&self, connection: &ConnectionId) {
        self.connections.remove(connection);
        self.rooms.retain(|_, members| {
            members.remove(connection);
            !members.is_empty()
        });
    }

    fn join(&self, connection: &ConnectionId, room: &Room) {
        self.rooms.entry(room.clone()).or_default().insert(connection.clone());
    }

    fn leave(&self, connection: &ConnectionId, room: &Room) {
        self.rooms.remove_if_mut(room, |_, members| {
            members.remove(connection);
            members.is_empty()
        });
    }

    async fn publish(&self, room: &Room, message: RealtimeMessage) -> PublishOutcome {
        let mut replies = JoinSet::new();
        for tx in self.members(room) {
            let (ack, reply) = Ack::pair();
            let outbound = Outbound { message: message.clone(), ack: Some(ack) };
            if tx.send(outbound).is_ok() {
                replies.spawn(async move { reply.await.unwrap_or(false) });
            }
        }
        if replies.is_empty() {
            return PublishOutcome::NoConnection;
        }

        let first_positive = async {
            while let Some(reply) = replies.join_next().await {
                if matches!(reply, Ok(true)) {
                    return true;
                }
            }
            false
        };

        match tokio::time::timeout(self.ack_timeout, first_positive).await {
            Ok(true) => PublishOutcome::Acknowledged,
            Ok(false) => PublishOutcome::Rejected,
            Err(_) => PublishOutcome::TimedOut,
        }
    }

    fn emit(&self, room: &Room, message: RealtimeMessage) -> usize {
        self.members(room)
            .into_iter()
            .filter(|tx| tx.send(Outbound { message: message.clone(), ack: None }).is_ok())
            .count()
    }

    fn emit_to(&self, connection: &ConnectionId, message: RealtimeMessage) -> bool {
        let Some(tx) = self.connections.get(connection).map(|tx| tx.clone()) else {
            return false;
        };
        tx.send(Outbound { message, ack: None }).is_ok()
    }

    fn is_online(&self, user: Uuid) -> bool {
        self.rooms.get(&Room::user(user)).is_some_and(|members| !members.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> RoomHub {
        RoomHub::new(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn publish_without_members_reports_no_connection() {
        let outcome = hub()
            .publish(&Room::user(Uuid::new_v4()), RealtimeMessage::new("notification", ()))
            .await;
        assert_eq!(outcome, PublishOutcome::NoConnection);
    }

    #[tokio::test]
    async fn acknowledged_publish_resolves() {
        let hub = hub();
        let user = Uuid::new_v4();
        let conn: ConnectionId = "c1".into();
        let mut rx = hub.attach(&conn);
        hub.join(&conn, &Room::user(user));
        assert!(hub.is_online(user));

        tokio::spawn(async move {
            while let Some(out) = rx.recv().await {
                if let Some(ack) = out.ack {
                    ack.report(true);
                }
            }
        });

        let outcome = hub
            .publish(&Room::user(user), RealtimeMessage::new("notification", serde_json::json!({ "n": 1 })))
            .await;
        assert_eq!(outcome, PublishOutcome::Acknowledged);
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let hub = hub();
        let user = Uuid::new_v4();
        let conn: ConnectionId = "c1".into();
        let _rx = hub.attach(&conn);
        hub.join(&conn, &Room::user(user));

        let outcome = hub.publish(&Room::user(user), RealtimeMessage::new("notification", ())).await;
        assert_eq!(outcome, PublishOutcome::TimedOut);
    }

    #[tokio::test]
    async fn detach_clears_presence_and_rooms() {
        let hub = hub();
        let user = Uuid::new_v4();
        let conn: ConnectionId = "c1".into();
        let _rx = hub.attach(&conn);
        hub.join(&conn, &Room::user(user));
        hub.detach(&conn);

        assert!(!hub.is_online(user));
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.emit(&Room::user(user), RealtimeMessage::new("x", ())), 0);
    }

    #[tokio::test]
    async fn emit_reaches_every_connection_of_the_user() {
        let hub = hub();
        let user = Uuid::new_v4();
        let (a, b): (ConnectionId, ConnectionId) = ("a".into(), "b".into());
        let mut rx_a = hub.attach(&a);
        let mut rx_b = hub.attach(&b);
        hub.join(&a, &Room::user(user));
        hub.join(&b, &Room::user(user));

        assert_eq!(hub.emit(&Room::user(user), RealtimeMessage::new("chat-message", "hi")), 2);
        assert_eq!(rx_a.recv().await.unwrap().message.event, "chat-message");
        assert_eq!(rx_b.recv().await.unwrap().message.event, "chat-message");

        hub.leave(&a, &Room::user(user));
        assert!(hub.is_online(user));
        hub.leave(&b, &Room::user(user));
        assert!(!hub.is_online(user));
    }
}
