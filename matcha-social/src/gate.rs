use std::sync::Arc;

use uuid::Uuid;

use matcha_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::Block;
use crate::store::RelationshipStore;

/// Symmetric block relation consulted before every cross-user write or push.
#[derive(Clone)]
pub struct BlockGate {
    store: Arc<dyn RelationshipStore>,
}

impl BlockGate {
    pub fn new(store: Arc<dyn RelationshipStore>) -> Self {
        Self { store }
    }

    /// True when either user blocked the other. Storage failure counts as blocked.
    pub fn is_blocked(&self, a: Uuid, b: Uuid) -> bool {
        match self.store.block_exists_between(a, b) {
            Ok(blocked) => blocked,
            Err(e) => {
                tracing::error!(error = %e, a = %a, b = %b, "block lookup failed, denying interaction");
                true
            }
        }
    }

    pub fn ensure_permitted(&self, a: Uuid, b: Uuid) -> AppResult<()> {
        if self.is_blocked(a, b) {
            return Err(AppError::not_permitted("interaction between these users is not permitted"));
        }
        Ok(())
    }

    pub fn block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<Block> {
        reject_self(blocker, blocked)?;
        require_profile(self.store.as_ref(), blocked)?;

        if self.store.find_block(blocker, blocked)?.is_some() {
            return Err(AppError::new(ErrorCode::AlreadyBlocked, "user is already blocked"));
        }

        let block = self.store.insert_block(blocker, blocked)?;
        tracing::info!(blocker = %blocker, blocked = %blocked, "user blocked");
        Ok(block)
    }

    /// Only removes the row in this direction; a reverse block stays in force.
    pub fn unblock(&self, blocker: Uuid, blocked: Uuid) -> AppResult<()> {
        reject_self(blocker, blocked)?;
        if !self.store.delete_block(blocker, blocked)? {
            return Err(AppError::new(ErrorCode::BlockNotFound, "no block to remove"));
        }
        tracing::info!(blocker = %blocker, blocked = %blocked, "user unblocked");
        Ok(())
    }

    pub fn list_blocked(&self, blocker: Uuid) -> AppResult<Vec<Block>> {
        self.store.list_blocked(blocker)
    }
}

pub(crate) fn reject_self(actor: Uuid, target: Uuid) -> AppResult<()> {
    if actor == target {
        return Err(AppError::new(ErrorCode::CannotInteractWithSelf, "cannot target yourself"));
    }
    Ok(())
}

pub(crate) fn require_profile(store: &dyn RelationshipStore, id: Uuid) -> AppResult<()> {
    if !store.profile_exists(id)? {
        return Err(AppError::new(ErrorCode::ProfileNotFound, "profile not found"));
    }
    Ok(())
}
