use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{blocks, chat_messages, likes, notification_changes, visits};

// --- Profile ---

/// Candidate-profile projection. Owned by the account service; this crate
/// only reads it, apart from the fame counter and `last_seen_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub sexual_preference: String,
    pub age: i32,
    pub biography: Option<String>,
    pub fame_rating: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub interests: Vec<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Haversine distance in km.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        const R: f64 = 6371.0;
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * R * a.sqrt().asin()
    }
}

// --- Like ---

/// One directed row per ordered pair; `is_like = false` is a dislike.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, PartialEq)]
#[diesel(table_name = likes)]
pub struct Like {
    pub id: Uuid,
    pub liker_id: Uuid,
    pub likee_id: Uuid,
    pub is_like: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Block ---

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, PartialEq)]
#[diesel(table_name = blocks)]
pub struct Block {
    pub id: Uuid,
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// --- Visit ---

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, PartialEq)]
#[diesel(table_name = visits)]
pub struct Visit {
    pub id: Uuid,
    pub visitor_id: Uuid,
    pub visited_id: Uuid,
    pub visit_time: DateTime<Utc>,
}

// --- ChatMessage ---

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, PartialEq)]
#[diesel(table_name = chat_messages)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chat_messages)]
pub struct NewChatMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: String,
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Like,
    Unlike,
    Match,
    Message,
    ProfileView,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Like => "LIKE",
            EntityType::Unlike => "UNLIKE",
            EntityType::Match => "MATCH",
            EntityType::Message => "MESSAGE",
            EntityType::ProfileView => "PROFILE_VIEW",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIKE" => Ok(EntityType::Like),
            "UNLIKE" => Ok(EntityType::Unlike),
            "MATCH" => Ok(EntityType::Match),
            "MESSAGE" => Ok(EntityType::Message),
            "PROFILE_VIEW" => Ok(EntityType::ProfileView),
            _ => Err(format!("unknown entity type: {s}")),
        }
    }
}

/// Delivery state of one (event, recipient) row. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,
    Received,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Received => "RECEIVED",
            DeliveryStatus::Read => "READ",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(DeliveryStatus::Sent),
            "RECEIVED" => Ok(DeliveryStatus::Received),
            "READ" => Ok(DeliveryStatus::Read),
            _ => Err(format!("unknown delivery status: {s}")),
        }
    }
}

pub const OBJECT_STATUS_ACTIVE: &str = "ACTIVE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationObject {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, PartialEq)]
#[diesel(table_name = notification_changes)]
pub struct NotificationChange {
    pub id: Uuid,
    pub notification_object_id: Uuid,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Delivery record: one per (event, recipient).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub notification_object_id: Uuid,
    pub notifier_id: Uuid,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for the single store transaction behind a fan-out.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub actor_id: Uuid,
    pub recipients: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub object: NotificationObject,
    pub change: NotificationChange,
    pub deliveries: Vec<Notification>,
}

/// A delivery row joined with its event and actor, as shown in the inbox and
/// pushed over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationView {
    pub id: Uuid,
    pub notification_object_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub actor_id: Uuid,
    pub notifier_id: Uuid,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}
