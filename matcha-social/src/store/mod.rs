//! Durable relationship records. Pure data access: no policy lives here.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use matcha_shared::errors::AppResult;

use crate::discovery::{DiscoveryPlan, ScoredProfile};
use crate::models::{
    Block, ChatMessage, DeliveryStatus, Like, NewChatMessage, NewEvent, NotificationView, Profile,
    RecordedEvent, Visit,
};

pub trait RelationshipStore: Send + Sync {
    // --- Profiles ---

    fn get_profile(&self, id: Uuid) -> AppResult<Option<Profile>>;

    fn profile_exists(&self, id: Uuid) -> AppResult<bool>;

    /// Storage-level atomic `fame_rating += delta`.
    fn adjust_fame(&self, id: Uuid, delta: i32) -> AppResult<()>;

    fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    // --- Blocks ---

    /// True when a block row exists in either direction.
    fn block_exists_between(&self, a: Uuid, b: Uuid) -> AppResult<bool>;

    fn find_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<Option<Block>>;

    fn insert_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<Block>;

    /// Returns whether a row was removed.
    fn delete_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<bool>;

    fn list_blocked(&self, blocker: Uuid) -> AppResult<Vec<Block>>;

    // --- Likes ---

    fn get_like(&self, liker: Uuid, likee: Uuid) -> AppResult<Option<Like>>;

    /// Create the directed row or flip it in place.
    fn upsert_like(&self, liker: Uuid, likee: Uuid, is_like: bool) -> AppResult<Like>;

    fn delete_like(&self, liker: Uuid, likee: Uuid) -> AppResult<bool>;

    /// Users mutually liked with `user`.
    fn list_matches(&self, user: Uuid) -> AppResult<Vec<Uuid>>;

    /// Rows pointing at `user` with `is_like = true`, newest first.
    fn list_likers(&self, user: Uuid) -> AppResult<Vec<Like>>;

    // --- Notifications ---

    /// Object, change and one SENT delivery per recipient that still has a
    /// profile, all in one transaction.
    fn record_event(&self, event: &NewEvent) -> AppResult<RecordedEvent>;

    /// Conditional status move; returns whether the row was in `from`.
    fn transition_delivery(&self, id: Uuid, from: &[DeliveryStatus], to: DeliveryStatus) -> AppResult<bool>;

    /// SENT deliveries for `user` in creation order.
    fn pending_deliveries(&self, user: Uuid) -> AppResult<Vec<NotificationView>>;

    fn notification_view(&self, id: Uuid) -> AppResult<Option<NotificationView>>;

    /// Everyone holding a delivery row for the given event.
    fn recipients_of(&self, object_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Newest first, with the total count.
    fn list_notifications(&self, user: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<NotificationView>, i64)>;

    fn count_unread(&self, user: Uuid) -> AppResult<i64>;

    /// `None` when the delivery does not exist or belongs to someone else.
    fn mark_read(&self, user: Uuid, id: Uuid) -> AppResult<Option<NotificationView>>;

    fn mark_all_read(&self, user: Uuid) -> AppResult<usize>;

    // --- Chat ---

    fn insert_chat_message(&self, message: &NewChatMessage) -> AppResult<ChatMessage>;

    /// Messages between `a` and `b`, newest first, strictly older than `before`.
    fn chat_history(&self, a: Uuid, b: Uuid, before: Option<DateTime<Utc>>, limit: i64) -> AppResult<Vec<ChatMessage>>;

    // --- Visits ---

    fn insert_visit(&self, visitor: Uuid, visited: Uuid) -> AppResult<Visit>;

    fn list_visitors(&self, visited: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<Visit>, i64)>;

    // --- Discovery ---

    fn search_profiles(&self, plan: &DiscoveryPlan) -> AppResult<Vec<ScoredProfile>>;
}
