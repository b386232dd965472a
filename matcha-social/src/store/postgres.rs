use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Double, Integer, Nullable, Text, Timestamptz};
use uuid::Uuid;

use matcha_shared::clients::db::{checkout, DbConnection, DbPool};
use matcha_shared::errors::{AppError, AppResult};

use super::RelationshipStore;
use crate::discovery::sql::{self, BindValue};
use crate::discovery::{DiscoveryPlan, ScoredProfile};
use crate::models::{
    Block, ChatMessage, DeliveryStatus, EntityType, Like, NewChatMessage, NewEvent, Notification,
    NotificationChange, NotificationObject, NotificationView, Profile, RecordedEvent, Visit, OBJECT_STATUS_ACTIVE,
};
use crate::schema::{
    blocks, chat_messages, likes, notification_changes, notification_objects, notifications, profile_interests,
    profiles, visits,
};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<DbConnection> {
        checkout(&self.pool)
    }

    /// Cheap round-trip used by the health route.
    pub fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}

// --- Row types for columns stored as text ---

#[derive(Queryable, Selectable)]
#[diesel(table_name = profiles)]
#[diesel(check_for_backend(Pg))]
struct ProfileRow {
    id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    gender: String,
    sexual_preference: String,
    age: i32,
    biography: Option<String>,
    fame_rating: i32,
    latitude: Option<f64>,
    longitude: Option<f64>,
    last_seen_at: Option<DateTime<Utc>>,
}

impl ProfileRow {
    fn into_profile(self, interests: Vec<String>) -> Profile {
        Profile {
            id: self.id,
            username: self.username,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            gender: self.gender,
            sexual_preference: self.sexual_preference,
            age: self.age,
            biography: self.biography,
            fame_rating: self.fame_rating,
            latitude: self.latitude,
            longitude: self.longitude,
            interests,
            last_seen_at: self.last_seen_at,
        }
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = notification_objects)]
#[diesel(check_for_backend(Pg))]
struct ObjectRow {
    id: Uuid,
    entity_type: String,
    entity_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ObjectRow> for NotificationObject {
    type Error = AppError;

    fn try_from(row: ObjectRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            entity_type: row.entity_type.parse::<EntityType>().map_err(AppError::internal)?,
            entity_id: row.entity_id,
            status: row.status,
            created_at: row.created_at,
        })
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(Pg))]
struct DeliveryRow {
    id: Uuid,
    notification_object_id: Uuid,
    notifier_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for Notification {
    type Error = AppError;

    fn try_from(row: DeliveryRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            notification_object_id: row.notification_object_id,
            notifier_id: row.notifier_id,
            status: row.status.parse::<DeliveryStatus>().map_err(AppError::internal)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

type ViewTuple = (Uuid, Uuid, String, Uuid, Uuid, Uuid, String, DateTime<Utc>);

fn into_view(row: ViewTuple) -> AppResult<NotificationView> {
    let (id, notification_object_id, entity_type, entity_id, actor_id, notifier_id, status, created_at) = row;
    Ok(NotificationView {
        id,
        notification_object_id,
        entity_type: entity_type.parse::<EntityType>().map_err(AppError::internal)?,
        entity_id,
        actor_id,
        notifier_id,
        status: status.parse::<DeliveryStatus>().map_err(AppError::internal)?,
        created_at,
    })
}

/// Delivery rows joined with their object and actor.
macro_rules! views {
    () => {
        notifications::table
            .inner_join(notification_objects::table.inner_join(notification_changes::table))
            .select((
                notifications::id,
                notifications::notification_object_id,
                notification_objects::entity_type,
                notification_objects::entity_id,
                notification_changes::actor_id,
                notifications::notifier_id,
                notifications::status,
                notifications::created_at,
            ))
    };
}

#[derive(QueryableByName)]
struct CandidateRow {
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    id: Uuid,
    #[diesel(sql_type = Text)]
    username: String,
    #[diesel(sql_type = Text)]
    email: String,
    #[diesel(sql_type = Text)]
    first_name: String,
    #[diesel(sql_type = Text)]
    last_name: String,
    #[diesel(sql_type = Text)]
    gender: String,
    #[diesel(sql_type = Text)]
    sexual_preference: String,
    #[diesel(sql_type = Integer)]
    age: i32,
    #[diesel(sql_type = Nullable<Text>)]
    biography: Option<String>,
    #[diesel(sql_type = Integer)]
    fame_rating: i32,
    #[diesel(sql_type = Nullable<Double>)]
    latitude: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    longitude: Option<f64>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    last_seen_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Double>)]
    distance_km: Option<f64>,
    #[diesel(sql_type = BigInt)]
    common_interests: i64,
    #[diesel(sql_type = Array<Text>)]
    interests: Vec<String>,
}

impl From<CandidateRow> for ScoredProfile {
    fn from(row: CandidateRow) -> Self {
        Self {
            profile: Profile {
                id: row.id,
                username: row.username,
                email: row.email,
                first_name: row.first_name,
                last_name: row.last_name,
                gender: row.gender,
                sexual_preference: row.sexual_preference,
                age: row.age,
                biography: row.biography,
                fame_rating: row.fame_rating,
                latitude: row.latitude,
                longitude: row.longitude,
                interests: row.interests,
                last_seen_at: row.last_seen_at,
            },
            distance_km: row.distance_km,
            common_interests: row.common_interests,
        }
    }
}

fn status_strings(statuses: &[DeliveryStatus]) -> Vec<&'static str> {
    statuses.iter().map(DeliveryStatus::as_str).collect()
}

impl RelationshipStore for PgStore {
    fn get_profile(&self, id: Uuid) -> AppResult<Option<Profile>> {
        let mut conn = self.conn()?;
        let Some(row) = profiles::table
            .find(id)
            .select(ProfileRow::as_select())
            .first(&mut conn)
            .optional()?
        else {
            return Ok(None);
        };
        let interests = profile_interests::table
            .filter(profile_interests::profile_id.eq(id))
            .select(profile_interests::tag)
            .order(profile_interests::tag.asc())
            .load::<String>(&mut conn)?;
        Ok(Some(row.into_profile(interests)))
    }

    fn profile_exists(&self, id: Uuid) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let exists = diesel::select(diesel::dsl::exists(profiles::table.find(id))).get_result(&mut conn)?;
        Ok(exists)
    }

    fn adjust_fame(&self, id: Uuid, delta: i32) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::update(profiles::table.find(id))
            .set(profiles::fame_rating.eq(profiles::fame_rating + delta))
            .execute(&mut conn)?;
        Ok(())
    }

    fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::update(profiles::table.find(id))
            .set(profiles::last_seen_at.eq(Some(at)))
            .execute(&mut conn)?;
        Ok(())
    }

    fn block_exists_between(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let exists = diesel::select(diesel::dsl::exists(
            blocks::table.filter(
                blocks::blocker_id
                    .eq(a)
                    .and(blocks::blocked_id.eq(b))
                    .or(blocks::blocker_id.eq(b).and(blocks::blocked_id.eq(a))),
            ),
        ))
        .get_result(&mut conn)?;
        Ok(exists)
    }

    fn find_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<Option<Block>> {
        let mut conn = self.conn()?;
        let block = blocks::table
            .filter(blocks::blocker_id.eq(blocker))
            .filter(blocks::blocked_id.eq(blocked))
            .select(Block::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(block)
    }

    fn insert_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<Block> {
        let mut conn = self.conn()?;
        diesel::insert_into(blocks::table)
            .values((blocks::blocker_id.eq(blocker), blocks::blocked_id.eq(blocked)))
            .on_conflict((blocks::blocker_id, blocks::blocked_id))
            .do_nothing()
            .execute(&mut conn)?;
        let block = blocks::table
            .filter(blocks::blocker_id.eq(blocker))
            .filter(blocks::blocked_id.eq(blocked))
            .select(Block::as_select())
            .first(&mut conn)?;
        Ok(block)
    }

    fn delete_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(
            blocks::table
                .filter(blocks::blocker_id.eq(blocker))
                .filter(blocks::blocked_id.eq(blocked)),
        )
        .execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn list_blocked(&self, blocker: Uuid) -> AppResult<Vec<Block>> {
        let mut conn = self.conn()?;
        let rows = blocks::table
            .filter(blocks::blocker_id.eq(blocker))
            .order(blocks::created_at.desc())
            .select(Block::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn get_like(&self, liker: Uuid, likee: Uuid) -> AppResult<Option<Like>> {
        let mut conn = self.conn()?;
        let like = likes::table
            .filter(likes::liker_id.eq(liker))
            .filter(likes::likee_id.eq(likee))
            .select(Like::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(like)
    }

    fn upsert_like(&self, liker: Uuid, likee: Uuid, is_like: bool) -> AppResult<Like> {
        let mut conn = self.conn()?;
        let like = diesel::insert_into(likes::table)
            .values((
                likes::liker_id.eq(liker),
                likes::likee_id.eq(likee),
                likes::is_like.eq(is_like),
            ))
            .on_conflict((likes::liker_id, likes::likee_id))
            .do_update()
            .set((likes::is_like.eq(is_like), likes::updated_at.eq(Utc::now())))
            .returning(Like::as_returning())
            .get_result(&mut conn)?;
        Ok(like)
    }

    fn delete_like(&self, liker: Uuid, likee: Uuid) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(
            likes::table
                .filter(likes::liker_id.eq(liker))
                .filter(likes::likee_id.eq(likee)),
        )
        .execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn list_matches(&self, user: Uuid) -> AppResult<Vec<Uuid>> {
        let mut conn = self.conn()?;
        let liked_back = likes::table
            .filter(likes::likee_id.eq(user))
            .filter(likes::is_like.eq(true))
            .select(likes::liker_id)
            .load::<Uuid>(&mut conn)?;
        let matches = likes::table
            .filter(likes::liker_id.eq(user))
            .filter(likes::is_like.eq(true))
            .filter(likes::likee_id.eq_any(&liked_back))
            .select(likes::likee_id)
            .order(likes::likee_id.asc())
            .load::<Uuid>(&mut conn)?;
        Ok(matches)
    }

    fn list_likers(&self, user: Uuid) -> AppResult<Vec<Like>> {
        let mut conn = self.conn()?;
        let rows = likes::table
            .filter(likes::likee_id.eq(user))
            .filter(likes::is_like.eq(true))
            .order(likes::updated_at.desc())
            .select(Like::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn record_event(&self, event: &NewEvent) -> AppResult<RecordedEvent> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            let existing = profiles::table
                .filter(profiles::id.eq_any(&event.recipients))
                .select(profiles::id)
                .load::<Uuid>(conn)?;

            let object: NotificationObject = diesel::insert_into(notification_objects::table)
                .values((
                    notification_objects::entity_type.eq(event.entity_type.as_str()),
                    notification_objects::entity_id.eq(event.entity_id),
                    notification_objects::status.eq(OBJECT_STATUS_ACTIVE),
                ))
                .returning(ObjectRow::as_returning())
                .get_result::<ObjectRow>(conn)?
                .try_into()?;

            let change: NotificationChange = diesel::insert_into(notification_changes::table)
                .values((
                    notification_changes::notification_object_id.eq(object.id),
                    notification_changes::actor_id.eq(event.actor_id),
                ))
                .returning(NotificationChange::as_returning())
                .get_result(conn)?;

            let rows: Vec<_> = event
                .recipients
                .iter()
                .filter(|r| existing.contains(r))
                .map(|r| {
                    (
                        notifications::notification_object_id.eq(object.id),
                        notifications::notifier_id.eq(*r),
                        notifications::status.eq(DeliveryStatus::Sent.as_str()),
                    )
                })
                .collect();

            let deliveries = if rows.is_empty() {
                Vec::new()
            } else {
                diesel::insert_into(notifications::table)
                    .values(&rows)
                    .returning(DeliveryRow::as_returning())
                    .get_results::<DeliveryRow>(conn)?
                    .into_iter()
                    .map(Notification::try_from)
                    .collect::<AppResult<Vec<_>>>()?
            };

            Ok(RecordedEvent { object, change, deliveries })
        })
    }

    fn transition_delivery(&self, id: Uuid, from: &[DeliveryStatus], to: DeliveryStatus) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            notifications::table
                .filter(notifications::id.eq(id))
                .filter(notifications::status.eq_any(status_strings(from))),
        )
        .set((notifications::status.eq(to.as_str()), notifications::updated_at.eq(Utc::now())))
        .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn pending_deliveries(&self, user: Uuid) -> AppResult<Vec<NotificationView>> {
        let mut conn = self.conn()?;
        views!()
            .filter(notifications::notifier_id.eq(user))
            .filter(notifications::status.eq(DeliveryStatus::Sent.as_str()))
            .order((notifications::created_at.asc(), notifications::id.asc()))
            .load::<ViewTuple>(&mut conn)?
            .into_iter()
            .map(into_view)
            .collect()
    }

    fn notification_view(&self, id: Uuid) -> AppResult<Option<NotificationView>> {
        let mut conn = self.conn()?;
        views!()
            .filter(notifications::id.eq(id))
            .first::<ViewTuple>(&mut conn)
            .optional()?
            .map(into_view)
            .transpose()
    }

    fn recipients_of(&self, object_id: Uuid) -> AppResult<Vec<Uuid>> {
        let mut conn = self.conn()?;
        let recipients = notifications::table
            .filter(notifications::notification_object_id.eq(object_id))
            .select(notifications::notifier_id)
            .load::<Uuid>(&mut conn)?;
        Ok(recipients)
    }

    fn list_notifications(&self, user: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<NotificationView>, i64)> {
        let mut conn = self.conn()?;
        let total: i64 = notifications::table
            .filter(notifications::notifier_id.eq(user))
            .count()
            .get_result(&mut conn)?;
        let items = views!()
            .filter(notifications::notifier_id.eq(user))
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .limit(limit)
            .offset(offset)
            .load::<ViewTuple>(&mut conn)?
            .into_iter()
            .map(into_view)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((items, total))
    }

    fn count_unread(&self, user: Uuid) -> AppResult<i64> {
        let mut conn = self.conn()?;
        let count = notifications::table
            .filter(notifications::notifier_id.eq(user))
            .filter(notifications::status.ne(DeliveryStatus::Read.as_str()))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    fn mark_read(&self, user: Uuid, id: Uuid) -> AppResult<Option<NotificationView>> {
        let mut conn = self.conn()?;
        diesel::update(
            notifications::table
                .filter(notifications::id.eq(id))
                .filter(notifications::notifier_id.eq(user))
                .filter(notifications::status.ne(DeliveryStatus::Read.as_str())),
        )
        .set((
            notifications::status.eq(DeliveryStatus::Read.as_str()),
            notifications::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        views!()
            .filter(notifications::id.eq(id))
            .filter(notifications::notifier_id.eq(user))
            .first::<ViewTuple>(&mut conn)
            .optional()?
            .map(into_view)
            .transpose()
    }

    fn mark_all_read(&self, user: Uuid) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            notifications::table
                .filter(notifications::notifier_id.eq(user))
                .filter(notifications::status.ne(DeliveryStatus::Read.as_str())),
        )
        .set((
            notifications::status.eq(DeliveryStatus::Read.as_str()),
            notifications::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;
        Ok(updated)
    }

    fn insert_chat_message(&self, message: &NewChatMessage) -> AppResult<ChatMessage> {
        let mut conn = self.conn()?;
        let stored = diesel::insert_into(chat_messages::table)
            .values(message)
            .returning(ChatMessage::as_returning())
            .get_result(&mut conn)?;
        Ok(stored)
    }

    fn chat_history(&self, a: Uuid, b: Uuid, before: Option<DateTime<Utc>>, limit: i64) -> AppResult<Vec<ChatMessage>> {
        let mut conn = self.conn()?;
        let mut query = chat_messages::table
            .filter(
                chat_messages::sender_id
                    .eq(a)
                    .and(chat_messages::receiver_id.eq(b))
                    .or(chat_messages::sender_id.eq(b).and(chat_messages::receiver_id.eq(a))),
            )
            .select(ChatMessage::as_select())
            .into_boxed();
        if let Some(cursor) = before {
            query = query.filter(chat_messages::sent_at.lt(cursor));
        }
        let rows = query
            .order((chat_messages::sent_at.desc(), chat_messages::id.desc()))
            .limit(limit)
            .load(&mut conn)?;
        Ok(rows)
    }

    fn insert_visit(&self, visitor: Uuid, visited: Uuid) -> AppResult<Visit> {
        let mut conn = self.conn()?;
        let visit = diesel::insert_into(visits::table)
            .values((visits::visitor_id.eq(visitor), visits::visited_id.eq(visited)))
            .returning(Visit::as_returning())
            .get_result(&mut conn)?;
        Ok(visit)
    }

    fn list_visitors(&self, visited: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<Visit>, i64)> {
        let mut conn = self.conn()?;
        let total: i64 = visits::table
            .filter(visits::visited_id.eq(visited))
            .count()
            .get_result(&mut conn)?;
        let items = visits::table
            .filter(visits::visited_id.eq(visited))
            .order(visits::visit_time.desc())
            .limit(limit)
            .offset(offset)
            .select(Visit::as_select())
            .load(&mut conn)?;
        Ok((items, total))
    }

    fn search_profiles(&self, plan: &DiscoveryPlan) -> AppResult<Vec<ScoredProfile>> {
        let statement = sql::render(plan);
        tracing::debug!(requester = %plan.requester, binds = statement.binds.len(), "discovery query");

        let mut query = diesel::sql_query(statement.text).into_boxed::<Pg>();
        for bind in statement.binds {
            query = match bind {
                BindValue::Uuid(v) => query.bind::<diesel::sql_types::Uuid, _>(v),
                BindValue::BigInt(v) => query.bind::<BigInt, _>(v),
                BindValue::Double(v) => query.bind::<Double, _>(v),
                BindValue::Text(v) => query.bind::<Text, _>(v),
                BindValue::BigIntList(v) => query.bind::<Array<BigInt>, _>(v),
                BindValue::TextList(v) => query.bind::<Array<Text>, _>(v),
            };
        }

        let mut conn = self.conn()?;
        let rows = query.load::<CandidateRow>(&mut conn)?;
        Ok(rows.into_iter().map(ScoredProfile::from).collect())
    }
}
