use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use matcha_shared::errors::{AppError, AppResult};

use super::RelationshipStore;
use crate::discovery::{Candidate, DiscoveryPlan, ScoredProfile};
use crate::models::{
    Block, ChatMessage, DeliveryStatus, Like, NewChatMessage, NewEvent, Notification, NotificationChange,
    NotificationObject, NotificationView, Profile, RecordedEvent, Visit, OBJECT_STATUS_ACTIVE,
};

#[derive(Default)]
struct State {
    profiles: HashMap<Uuid, Profile>,
    likes: HashMap<(Uuid, Uuid), Like>,
    blocks: Vec<Block>,
    visits: Vec<Visit>,
    messages: Vec<ChatMessage>,
    objects: Vec<NotificationObject>,
    changes: Vec<NotificationChange>,
    deliveries: Vec<Notification>,
    clock: Option<DateTime<Utc>>,
}

impl State {
    /// Strictly increasing timestamps so creation order survives ties.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn view(&self, delivery: &Notification) -> Option<NotificationView> {
        let object = self.objects.iter().find(|o| o.id == delivery.notification_object_id)?;
        let change = self
            .changes
            .iter()
            .find(|c| c.notification_object_id == object.id)?;
        Some(NotificationView {
            id: delivery.id,
            notification_object_id: object.id,
            entity_type: object.entity_type,
            entity_id: object.entity_id,
            actor_id: change.actor_id,
            notifier_id: delivery.notifier_id,
            status: delivery.status,
            created_at: delivery.created_at,
        })
    }
}

/// In-process store used by the integration tests and for running the
/// engine without a database.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
    failing_like_reads: RwLock<HashSet<(Uuid, Uuid)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a transient error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make reads of the directed like row `liker -> likee` fail.
    pub fn fail_like_reads(&self, liker: Uuid, likee: Uuid) {
        self.failing_like_reads
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((liker, likee));
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.inspect_mut(|s| {
            s.profiles.insert(profile.id, profile);
        });
    }

    pub fn remove_profile(&self, id: Uuid) {
        self.inspect_mut(|s| {
            s.profiles.remove(&id);
        });
    }

    pub fn notification_objects(&self) -> Vec<NotificationObject> {
        self.inspect(|s| s.objects.clone())
    }

    pub fn notification_changes(&self) -> Vec<NotificationChange> {
        self.inspect(|s| s.changes.clone())
    }

    pub fn deliveries(&self) -> Vec<Notification> {
        self.inspect(|s| s.deliveries.clone())
    }

    pub fn like_rows(&self) -> Vec<Like> {
        self.inspect(|s| s.likes.values().cloned().collect())
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inspect(|s| s.messages.clone())
    }

    fn inspect<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    fn inspect_mut<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::unavailable("storage unavailable"));
        }
        Ok(())
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, State>> {
        self.check_available()?;
        self.state.read().map_err(|_| AppError::internal("store lock poisoned"))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, State>> {
        self.check_available()?;
        self.state.write().map_err(|_| AppError::internal("store lock poisoned"))
    }
}

fn pair_matches(message: &ChatMessage, a: Uuid, b: Uuid) -> bool {
    (message.sender_id == a && message.receiver_id == b) || (message.sender_id == b && message.receiver_id == a)
}

impl RelationshipStore for MemoryStore {
    fn get_profile(&self, id: Uuid) -> AppResult<Option<Profile>> {
        Ok(self.read()?.profiles.get(&id).cloned())
    }

    fn profile_exists(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.read()?.profiles.contains_key(&id))
    }

    fn adjust_fame(&self, id: Uuid, delta: i32) -> AppResult<()> {
        if let Some(profile) = self.write()?.profiles.get_mut(&id) {
            profile.fame_rating += delta;
        }
        Ok(())
    }

    fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(profile) = self.write()?.profiles.get_mut(&id) {
            profile.last_seen_at = Some(at);
        }
        Ok(())
    }

    fn block_exists_between(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        Ok(self.read()?.blocks.iter().any(|bl| {
            (bl.blocker_id == a && bl.blocked_id == b) || (bl.blocker_id == b && bl.blocked_id == a)
        }))
    }

    fn find_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<Option<Block>> {
        Ok(self
            .read()?
            .blocks
            .iter()
            .find(|b| b.blocker_id == blocker && b.blocked_id == blocked)
            .cloned())
    }

    fn insert_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<Block> {
        let mut state = self.write()?;
        if let Some(existing) = state
            .blocks
            .iter()
            .find(|b| b.blocker_id == blocker && b.blocked_id == blocked)
        {
            return Ok(existing.clone());
        }
        let block = Block {
            id: Uuid::now_v7(),
            blocker_id: blocker,
            blocked_id: blocked,
            created_at: state.tick(),
        };
        state.blocks.push(block.clone());
        Ok(block)
    }

    fn delete_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<bool> {
        let mut state = self.write()?;
        let before = state.blocks.len();
        state.blocks.retain(|b| !(b.blocker_id == blocker && b.blocked_id == blocked));
        Ok(state.blocks.len() != before)
    }

    fn list_blocked(&self, blocker: Uuid) -> AppResult<Vec<Block>> {
        let mut blocks: Vec<Block> = self
            .read()?
            .blocks
            .iter()
            .filter(|b| b.blocker_id == blocker)
            .cloned()
            .collect();
        blocks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(blocks)
    }

    fn get_like(&self, liker: Uuid, likee: Uuid) -> AppResult<Option<Like>> {
        let failing = self
            .failing_like_reads
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(liker, likee));
        if failing {
            return Err(AppError::unavailable("storage unavailable"));
        }
        Ok(self.read()?.likes.get(&(liker, likee)).cloned())
    }

    fn upsert_like(&self, liker: Uuid, likee: Uuid, is_like: bool) -> AppResult<Like> {
        let mut state = self.write()?;
        let now = state.tick();
        let like = state
            .likes
            .entry((liker, likee))
            .and_modify(|l| {
                l.is_like = is_like;
                l.updated_at = now;
            })
            .or_insert_with(|| Like {
                id: Uuid::now_v7(),
                liker_id: liker,
                likee_id: likee,
                is_like,
                created_at: now,
                updated_at: now,
            });
        Ok(like.clone())
    }

    fn delete_like(&self, liker: Uuid, likee: Uuid) -> AppResult<bool> {
        Ok(self.write()?.likes.remove(&(liker, likee)).is_some())
    }

    fn list_matches(&self, user: Uuid) -> AppResult<Vec<Uuid>> {
        let state = self.read()?;
        let mut matches: Vec<Uuid> = state
            .likes
            .values()
            .filter(|l| l.liker_id == user && l.is_like)
            .filter(|l| {
                state
                    .likes
                    .get(&(l.likee_id, user))
                    .is_some_and(|reverse| reverse.is_like)
            })
            .map(|l| l.likee_id)
            .collect();
        matches.sort();
        Ok(matches)
    }

    fn list_likers(&self, user: Uuid) -> AppResult<Vec<Like>> {
        let mut likers: Vec<Like> = self
            .read()?
            .likes
            .values()
            .filter(|l| l.likee_id == user && l.is_like)
            .cloned()
            .collect();
        likers.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(likers)
    }

    fn record_event(&self, event: &NewEvent) -> AppResult<RecordedEvent> {
        let mut state = self.write()?;
        let now = state.tick();

        let object = NotificationObject {
            id: Uuid::now_v7(),
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            status: OBJECT_STATUS_ACTIVE.to_string(),
            created_at: now,
        };
        let change = NotificationChange {
            id: Uuid::now_v7(),
            notification_object_id: object.id,
            actor_id: event.actor_id,
            created_at: now,
        };
        let deliveries: Vec<Notification> = event
            .recipients
            .iter()
            .filter(|r| state.profiles.contains_key(r))
            .map(|r| Notification {
                id: Uuid::now_v7(),
                notification_object_id: object.id,
                notifier_id: *r,
                status: DeliveryStatus::Sent,
                created_at: now,
                updated_at: now,
            })
            .collect();

        state.objects.push(object.clone());
        state.changes.push(change.clone());
        state.deliveries.extend(deliveries.iter().cloned());

        Ok(RecordedEvent { object, change, deliveries })
    }

    fn transition_delivery(&self, id: Uuid, from: &[DeliveryStatus], to: DeliveryStatus) -> AppResult<bool> {
        let mut state = self.write()?;
        let now = state.tick();
        match state.deliveries.iter_mut().find(|d| d.id == id) {
            Some(delivery) if from.contains(&delivery.status) => {
                delivery.status = to;
                delivery.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn pending_deliveries(&self, user: Uuid) -> AppResult<Vec<NotificationView>> {
        let state = self.read()?;
        Ok(state
            .deliveries
            .iter()
            .filter(|d| d.notifier_id == user && d.status == DeliveryStatus::Sent)
            .filter_map(|d| state.view(d))
            .collect())
    }

    fn notification_view(&self, id: Uuid) -> AppResult<Option<NotificationView>> {
        let state = self.read()?;
        Ok(state.deliveries.iter().find(|d| d.id == id).and_then(|d| state.view(d)))
    }

    fn recipients_of(&self, object_id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .read()?
            .deliveries
            .iter()
            .filter(|d| d.notification_object_id == object_id)
            .map(|d| d.notifier_id)
            .collect())
    }

    fn list_notifications(&self, user: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<NotificationView>, i64)> {
        let state = self.read()?;
        let mine: Vec<&Notification> = state.deliveries.iter().filter(|d| d.notifier_id == user).collect();
        let total = mine.len() as i64;
        let items = mine
            .into_iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|d| state.view(d))
            .collect();
        Ok((items, total))
    }

    fn count_unread(&self, user: Uuid) -> AppResult<i64> {
        Ok(self
            .read()?
            .deliveries
            .iter()
            .filter(|d| d.notifier_id == user && d.status != DeliveryStatus::Read)
            .count() as i64)
    }

    fn mark_read(&self, user: Uuid, id: Uuid) -> AppResult<Option<NotificationView>> {
        let mut state = self.write()?;
        let now = state.tick();
        let Some(delivery) = state
            .deliveries
            .iter_mut()
            .find(|d| d.id == id && d.notifier_id == user)
        else {
            return Ok(None);
        };
        if delivery.status != DeliveryStatus::Read {
            delivery.status = DeliveryStatus::Read;
            delivery.updated_at = now;
        }
        let delivery = delivery.clone();
        Ok(state.view(&delivery))
    }

    fn mark_all_read(&self, user: Uuid) -> AppResult<usize> {
        let mut state = self.write()?;
        let now = state.tick();
        let mut updated = 0;
        for delivery in state
            .deliveries
            .iter_mut()
            .filter(|d| d.notifier_id == user && d.status != DeliveryStatus::Read)
        {
            delivery.status = DeliveryStatus::Read;
            delivery.updated_at = now;
            updated += 1;
        }
        Ok(updated)
    }

    fn insert_chat_message(&self, message: &NewChatMessage) -> AppResult<ChatMessage> {
        let mut state = self.write()?;
        let message = ChatMessage {
            id: Uuid::now_v7(),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            body: message.body.clone(),
            sent_at: state.tick(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    fn chat_history(&self, a: Uuid, b: Uuid, before: Option<DateTime<Utc>>, limit: i64) -> AppResult<Vec<ChatMessage>> {
        Ok(self
            .read()?
            .messages
            .iter()
            .rev()
            .filter(|m| pair_matches(m, a, b))
            .filter(|m| before.map_or(true, |cursor| m.sent_at < cursor))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    fn insert_visit(&self, visitor: Uuid, visited: Uuid) -> AppResult<Visit> {
        let mut state = self.write()?;
        let visit = Visit {
            id: Uuid::now_v7(),
            visitor_id: visitor,
            visited_id: visited,
            visit_time: state.tick(),
        };
        state.visits.push(visit.clone());
        Ok(visit)
    }

    fn list_visitors(&self, visited: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<Visit>, i64)> {
        let state = self.read()?;
        let mine: Vec<&Visit> = state.visits.iter().filter(|v| v.visited_id == visited).collect();
        let total = mine.len() as i64;
        let items = mine
            .into_iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    fn search_profiles(&self, plan: &DiscoveryPlan) -> AppResult<Vec<ScoredProfile>> {
        let state = self.read()?;
        let me = plan.requester;
        let my_tags: HashSet<&str> = state
            .profiles
            .get(&me)
            .map(|p| p.interests.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let excluded = |id: Uuid| {
            id == me
                || state.likes.contains_key(&(me, id))
                || state.blocks.iter().any(|b| {
                    (b.blocker_id == me && b.blocked_id == id) || (b.blocker_id == id && b.blocked_id == me)
                })
        };

        let mut candidates: Vec<Candidate<'_>> = state
            .profiles
            .values()
            .filter(|p| !excluded(p.id))
            .map(|p| Candidate {
                profile: p,
                distance_km: plan
                    .origin
                    .zip(p.location())
                    .map(|(origin, there)| origin.distance_km(&there)),
                common_interests: p.interests.iter().filter(|t| my_tags.contains(t.as_str())).count() as i64,
            })
            .filter(|c| plan.admits(c))
            .collect();

        candidates.sort_by(|a, b| plan.compare(a, b));

        Ok(candidates
            .into_iter()
            .take(plan.limit.max(0) as usize)
            .map(|c| ScoredProfile {
                profile: c.profile.clone(),
                distance_km: c.distance_km,
                common_interests: c.common_interests,
            })
            .collect())
    }
}
