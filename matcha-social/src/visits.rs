use std::sync::Arc;

use uuid::Uuid;

use matcha_shared::errors::AppResult;
use matcha_shared::types::pagination::{Paginated, PaginationParams};

use crate::gate::{reject_self, require_profile, BlockGate};
use crate::models::{EntityType, Visit};
use crate::notifications::NotificationService;
use crate::store::RelationshipStore;

pub struct VisitLog {
    store: Arc<dyn RelationshipStore>,
    gate: BlockGate,
    notifications: NotificationService,
}

impl VisitLog {
    pub fn new(store: Arc<dyn RelationshipStore>, gate: BlockGate, notifications: NotificationService) -> Self {
        Self { store, gate, notifications }
    }

    pub fn record(&self, visitor: Uuid, visited: Uuid) -> AppResult<Visit> {
        reject_self(visitor, visited)?;
        require_profile(self.store.as_ref(), visited)?;
        self.gate.ensure_permitted(visitor, visited)?;

        let visit = self.store.insert_visit(visitor, visited)?;
        if let Err(e) = self
            .notifications
            .create_and_send(EntityType::ProfileView, visit.id, visitor, &[visited])
        {
            tracing::error!(error = %e, visit_id = %visit.id, "profile view notification failed");
        }

        tracing::debug!(visitor = %visitor, visited = %visited, "profile visit recorded");
        Ok(visit)
    }

    pub fn visitors(&self, user: Uuid, params: &PaginationParams) -> AppResult<Paginated<Visit>> {
        let (items, total) = self
            .store
            .list_visitors(user, params.limit() as i64, params.offset() as i64)?;
        Ok(Paginated::new(items, total.max(0) as u64, params))
    }
}
