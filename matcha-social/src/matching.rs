use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use matcha_shared::errors::{AppError, AppResult, ErrorCode};

use crate::gate::{reject_self, require_profile, BlockGate};
use crate::models::{EntityType, Like};
use crate::notifications::NotificationService;
use crate::store::RelationshipStore;

/// State of one directed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LikeState {
    None,
    Liked,
    Disliked,
}

impl From<Option<&Like>> for LikeState {
    fn from(row: Option<&Like>) -> Self {
        match row {
            None => LikeState::None,
            Some(like) if like.is_like => LikeState::Liked,
            Some(_) => LikeState::Disliked,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub state: LikeState,
    pub reverse_state: LikeState,
    pub both_matched: bool,
}

impl Relationship {
    fn new(user_id: Uuid, target_id: Uuid, state: LikeState, reverse_state: LikeState) -> Self {
        Self {
            user_id,
            target_id,
            state,
            reverse_state,
            both_matched: state == LikeState::Liked && reverse_state == LikeState::Liked,
        }
    }
}

type PairKey = (Uuid, Uuid);

/// Held for the duration of one transition. Releasing it drops the pair's
/// lock entry once nobody else is holding or waiting on it.
struct PairGuard<'a> {
    key: PairKey,
    locks: &'a DashMap<PairKey, Arc<Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Owns every like/dislike/unlike transition.
pub struct MatchStateMachine {
    store: Arc<dyn RelationshipStore>,
    gate: BlockGate,
    notifications: NotificationService,
    pair_locks: DashMap<PairKey, Arc<Mutex<()>>>,
}

impl MatchStateMachine {
    pub fn new(store: Arc<dyn RelationshipStore>, gate: BlockGate, notifications: NotificationService) -> Self {
        Self {
            store,
            gate,
            notifications,
            pair_locks: DashMap::new(),
        }
    }

    /// One lock per unordered pair, so A→B and B→A serialize against each other.
    async fn lock_pair(&self, a: Uuid, b: Uuid) -> PairGuard<'_> {
        let key = if a < b { (a, b) } else { (b, a) };
        let lock = self.pair_locks.entry(key).or_default().clone();
        PairGuard {
            key,
            locks: &self.pair_locks,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of pairs currently holding a lock entry.
    pub fn locked_pairs(&self) -> usize {
        self.pair_locks.len()
    }

    /// The other direction, read after our own write has committed. A failed
    /// read is reported as no row so the committed write is still answered.
    fn reverse_state(&self, actor: Uuid, target: Uuid) -> LikeState {
        match self.store.get_like(target, actor) {
            Ok(row) => LikeState::from(row.as_ref()),
            Err(e) => {
                tracing::error!(error = %e, user_id = %actor, target = %target, "reverse like lookup failed");
                LikeState::None
            }
        }
    }

    fn guard_target(&self, actor: Uuid, target: Uuid) -> AppResult<()> {
        reject_self(actor, target)?;
        require_profile(self.store.as_ref(), target)?;
        self.gate.ensure_permitted(actor, target)
    }

    fn adjust_fame(&self, target: Uuid, delta: i32) {
        if let Err(e) = self.store.adjust_fame(target, delta) {
            tracing::error!(error = %e, user_id = %target, delta, "fame adjustment failed");
        }
    }

    fn emit(&self, entity_type: EntityType, entity_id: Uuid, actor: Uuid, receivers: &[Uuid]) {
        if let Err(e) = self.notifications.create_and_send(entity_type, entity_id, actor, receivers) {
            tracing::error!(error = %e, entity_type = %entity_type, actor = %actor, "notification fan-out failed");
        }
    }

    pub async fn like(&self, actor: Uuid, target: Uuid) -> AppResult<Relationship> {
        self.guard_target(actor, target)?;

        let _pair = self.lock_pair(actor, target).await;

        let current = self.store.get_like(actor, target)?;
        if LikeState::from(current.as_ref()) == LikeState::Liked {
            return Err(AppError::new(ErrorCode::AlreadyLiked, "profile already liked"));
        }

        let like = self.store.upsert_like(actor, target, true)?;
        self.adjust_fame(target, 1);

        let reverse = self.reverse_state(actor, target);
        let relationship = Relationship::new(actor, target, LikeState::Liked, reverse);

        counter!("likes_total", "kind" => "like").increment(1);
        if relationship.both_matched {
            tracing::info!(user_a = %actor, user_b = %target, "match created");
            self.emit(EntityType::Match, like.id, actor, &[actor, target]);
        } else {
            tracing::debug!(liker = %actor, likee = %target, "profile liked");
            self.emit(EntityType::Like, like.id, actor, &[target]);
        }

        Ok(relationship)
    }

    pub async fn dislike(&self, actor: Uuid, target: Uuid) -> AppResult<Relationship> {
        self.guard_target(actor, target)?;

        let _pair = self.lock_pair(actor, target).await;

        let current = self.store.get_like(actor, target)?;
        if LikeState::from(current.as_ref()) == LikeState::Disliked {
            return Err(AppError::new(ErrorCode::AlreadyDisliked, "profile already disliked"));
        }

        let like = self.store.upsert_like(actor, target, false)?;
        self.adjust_fame(target, -1);

        let reverse = self.reverse_state(actor, target);

        counter!("likes_total", "kind" => "dislike").increment(1);
        tracing::debug!(user_id = %actor, target = %target, "profile disliked");
        self.emit(EntityType::Unlike, like.id, actor, &[target]);

        Ok(Relationship::new(actor, target, LikeState::Disliked, reverse))
    }

    pub async fn unlike(&self, actor: Uuid, target: Uuid) -> AppResult<Relationship> {
        reject_self(actor, target)?;

        let _pair = self.lock_pair(actor, target).await;

        let Some(like) = self.store.get_like(actor, target)?.filter(|l| l.is_like) else {
            return Err(AppError::new(ErrorCode::LikeNotFound, "no like to remove"));
        };

        self.store.delete_like(actor, target)?;
        self.adjust_fame(target, -1);

        let reverse = self.reverse_state(actor, target);

        counter!("likes_total", "kind" => "unlike").increment(1);
        tracing::debug!(user_id = %actor, target = %target, "like removed");
        self.emit(EntityType::Unlike, like.id, actor, &[target]);

        Ok(Relationship::new(actor, target, LikeState::None, reverse))
    }

    pub fn relationship(&self, user: Uuid, target: Uuid) -> AppResult<Relationship> {
        reject_self(user, target)?;
        let state = LikeState::from(self.store.get_like(user, target)?.as_ref());
        let reverse = LikeState::from(self.store.get_like(target, user)?.as_ref());
        Ok(Relationship::new(user, target, state, reverse))
    }

    pub fn list_matches(&self, user: Uuid) -> AppResult<Vec<Uuid>> {
        self.store.list_matches(user)
    }

    pub fn list_likers(&self, user: Uuid) -> AppResult<Vec<Like>> {
        self.store.list_likers(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_matched_needs_likes_in_both_directions() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(Relationship::new(a, b, LikeState::Liked, LikeState::Liked).both_matched);
        assert!(!Relationship::new(a, b, LikeState::Liked, LikeState::Disliked).both_matched);
        assert!(!Relationship::new(a, b, LikeState::None, LikeState::Liked).both_matched);
    }

    #[test]
    fn like_state_serializes_in_upper_case() {
        assert_eq!(serde_json::to_string(&LikeState::Disliked).unwrap(), "\"DISLIKED\"");
    }
}
