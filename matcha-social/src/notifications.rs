use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashSet;
use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use matcha_shared::errors::{AppError, AppResult, ErrorCode};
use matcha_shared::types::pagination::{Paginated, PaginationParams};

use crate::gate::BlockGate;
use crate::models::{DeliveryStatus, EntityType, NewEvent, NotificationView, RecordedEvent};
use crate::realtime::{Broker, PublishOutcome, RealtimeMessage, Room};
use crate::store::RelationshipStore;

pub const NOTIFICATION_EVENT: &str = "notification";

/// What a push carries: the delivery row plus, for a match, the other party.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    #[serde(flatten)]
    pub notification: NotificationView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<Uuid>,
}

/// Result of one fan-out: the recorded rows and a handle per spawned push.
pub struct FanOut {
    pub event: RecordedEvent,
    pub pushes: Vec<JoinHandle<PublishOutcome>>,
}

impl FanOut {
    /// Wait for every push to settle. Used by callers that need the final
    /// delivery status, and by tests.
    pub async fn settle(self) -> Vec<PublishOutcome> {
        let mut outcomes = Vec::with_capacity(self.pushes.len());
        for push in self.pushes {
            outcomes.push(push.await.unwrap_or(PublishOutcome::Rejected));
        }
        outcomes
    }
}

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn RelationshipStore>,
    gate: BlockGate,
    broker: Arc<dyn Broker>,
    /// Deliveries with a push currently outstanding. A delivery is pushed by
    /// at most one task at a time.
    in_flight: Arc<DashSet<Uuid>>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn RelationshipStore>, gate: BlockGate, broker: Arc<dyn Broker>) -> Self {
        Self {
            store,
            gate,
            broker,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Record one event for `receivers` and push it to whoever is connected.
    ///
    /// The sender is dropped from the audience except for a match, where both
    /// parties are told. Blocked receivers are dropped, vanished profiles are
    /// skipped, and nothing here ever undoes the caller's own write.
    pub fn create_and_send(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        sender: Uuid,
        receivers: &[Uuid],
    ) -> AppResult<FanOut> {
        let mut seen = HashSet::new();
        let recipients: Vec<Uuid> = receivers
            .iter()
            .copied()
            .filter(|r| seen.insert(*r))
            .filter(|r| entity_type == EntityType::Match || *r != sender)
            .filter(|r| {
                let blocked = *r != sender && self.gate.is_blocked(sender, *r);
                if blocked {
                    tracing::debug!(sender = %sender, receiver = %r, "receiver blocked, dropped from fan-out");
                }
                !blocked
            })
            .collect();

        let event = self.store.record_event(&NewEvent {
            entity_type,
            entity_id,
            actor_id: sender,
            recipients: recipients.clone(),
        })?;

        counter!("notifications_created_total", "entity_type" => entity_type.as_str()).increment(1);
        tracing::debug!(
            object_id = %event.object.id,
            entity_type = %entity_type,
            deliveries = event.deliveries.len(),
            "notification recorded"
        );

        let pushes = event
            .deliveries
            .iter()
            .map(|delivery| {
                let payload = NotificationPayload {
                    notification: NotificationView {
                        id: delivery.id,
                        notification_object_id: event.object.id,
                        entity_type,
                        entity_id,
                        actor_id: sender,
                        notifier_id: delivery.notifier_id,
                        status: delivery.status,
                        created_at: delivery.created_at,
                    },
                    peer_id: match_peer(entity_type, sender, delivery.notifier_id, &recipients),
                };
                self.in_flight.insert(delivery.id);
                let service = self.clone();
                tokio::spawn(async move { service.push(payload).await })
            })
            .collect();

        Ok(FanOut { event, pushes })
    }

    /// Push one claimed delivery, record a positive acknowledgment and
    /// release the claim.
    async fn push(&self, payload: NotificationPayload) -> PublishOutcome {
        let id = payload.notification.id;
        let notifier = payload.notification.notifier_id;
        let outcome = self
            .broker
            .publish(&Room::user(notifier), RealtimeMessage::new(NOTIFICATION_EVENT, &payload))
            .await;

        counter!("notification_pushes_total", "outcome" => outcome.as_str()).increment(1);

        if outcome == PublishOutcome::Acknowledged {
            match self.store.transition_delivery(id, &[DeliveryStatus::Sent], DeliveryStatus::Received) {
                Ok(_) => tracing::debug!(notification_id = %id, notifier = %notifier, "notification received"),
                Err(e) => tracing::error!(error = %e, notification_id = %id, "failed to record acknowledgment"),
            }
        } else {
            tracing::debug!(notification_id = %id, outcome = outcome.as_str(), "notification left pending");
        }
        self.in_flight.remove(&id);
        outcome
    }

    /// Re-push the SENT deliveries `user` has right now, oldest first, one
    /// at a time. The set is read before returning, so anything recorded
    /// afterwards is left to its own live push.
    pub fn replay_pending(&self, user: Uuid) -> JoinHandle<Vec<PublishOutcome>> {
        let pending = match self.store.pending_deliveries(user) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(error = %e, user_id = %user, "failed to load pending notifications");
                Vec::new()
            }
        };
        if !pending.is_empty() {
            tracing::info!(user_id = %user, count = pending.len(), "replaying pending notifications");
        }

        let service = self.clone();
        tokio::spawn(async move {
            let mut outcomes = Vec::with_capacity(pending.len());
            for notification in pending {
                if !service.claim_pending(notification.id) {
                    tracing::debug!(notification_id = %notification.id, "already delivered or in flight, skipped");
                    continue;
                }
                let peer_id = service.stored_peer(&notification);
                outcomes.push(service.push(NotificationPayload { notification, peer_id }).await);
            }
            outcomes
        })
    }

    /// Claim a delivery for replay if no push holds it and it is still SENT.
    fn claim_pending(&self, id: Uuid) -> bool {
        if !self.in_flight.insert(id) {
            return false;
        }
        let still_pending = match self.store.notification_view(id) {
            Ok(view) => view.is_some_and(|v| v.status == DeliveryStatus::Sent),
            Err(e) => {
                tracing::warn!(error = %e, notification_id = %id, "could not recheck delivery status");
                true
            }
        };
        if !still_pending {
            self.in_flight.remove(&id);
        }
        still_pending
    }

    fn stored_peer(&self, view: &NotificationView) -> Option<Uuid> {
        if view.entity_type != EntityType::Match {
            return None;
        }
        if view.actor_id != view.notifier_id {
            return Some(view.actor_id);
        }
        match self.store.recipients_of(view.notification_object_id) {
            Ok(recipients) => match_peer(view.entity_type, view.actor_id, view.notifier_id, &recipients),
            Err(e) => {
                tracing::warn!(error = %e, "could not resolve match peer");
                None
            }
        }
    }

    pub fn list(&self, user: Uuid, params: &PaginationParams) -> AppResult<Paginated<NotificationView>> {
        let (items, total) = self
            .store
            .list_notifications(user, params.limit() as i64, params.offset() as i64)?;
        Ok(Paginated::new(items, total.max(0) as u64, params))
    }

    pub fn unread_count(&self, user: Uuid) -> AppResult<i64> {
        self.store.count_unread(user)
    }

    pub fn mark_read(&self, user: Uuid, notification_id: Uuid) -> AppResult<NotificationView> {
        self.store
            .mark_read(user, notification_id)?
            .ok_or_else(|| AppError::new(ErrorCode::NotificationNotFound, "notification not found"))
    }

    pub fn mark_all_read(&self, user: Uuid) -> AppResult<usize> {
        let updated = self.store.mark_all_read(user)?;
        tracing::debug!(user_id = %user, updated, "notifications marked read");
        Ok(updated)
    }
}

fn match_peer(entity_type: EntityType, actor: Uuid, notifier: Uuid, recipients: &[Uuid]) -> Option<Uuid> {
    if entity_type != EntityType::Match {
        return None;
    }
    if notifier != actor {
        return Some(actor);
    }
    recipients.iter().copied().find(|r| *r != actor)
}
