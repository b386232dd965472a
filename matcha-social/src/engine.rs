use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use matcha_shared::errors::{AppError, AppResult, ErrorCode};
use matcha_shared::types::pagination::{CursorPage, Paginated, PaginationParams};
use matcha_shared::ApiErrorDetail;

use crate::chat::{ChatBounds, ChatPayload, ChatService};
use crate::discovery::{self, DiscoveredProfile, LimitBounds};
use crate::gate::BlockGate;
use crate::matching::{MatchStateMachine, Relationship};
use crate::models::{Block, ChatMessage, Like, NotificationView, Visit};
use crate::notifications::NotificationService;
use crate::realtime::{Broker, ConnectionId, Outbound, PublishOutcome, RealtimeMessage, Room};
use crate::store::RelationshipStore;
use crate::visits::VisitLog;

pub const CONNECTED_EVENT: &str = "connected";
pub const ERROR_EVENT: &str = "error";

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub push_ack_timeout: Duration,
    pub chat: ChatBounds,
    pub discovery: LimitBounds,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            push_ack_timeout: Duration::from_secs(5),
            chat: ChatBounds::default(),
            discovery: LimitBounds::default(),
        }
    }
}

/// Inbound `mark-read` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkReadPayload {
    pub notification_id: Uuid,
}

#[derive(Debug, Serialize)]
struct ConnectedPayload {
    user_id: Uuid,
}

/// Handles returned to the transport when a connection comes up.
pub struct Session {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub replay: JoinHandle<Vec<PublishOutcome>>,
}

/// The social engine: built once at startup and shared by the HTTP and
/// realtime layers.
pub struct SocialEngine {
    store: Arc<dyn RelationshipStore>,
    broker: Arc<dyn Broker>,
    gate: BlockGate,
    matching: MatchStateMachine,
    notifications: NotificationService,
    chat: ChatService,
    visits: VisitLog,
    settings: EngineSettings,
}

impl SocialEngine {
    pub fn new(store: Arc<dyn RelationshipStore>, broker: Arc<dyn Broker>, settings: EngineSettings) -> Self {
        let gate = BlockGate::new(store.clone());
        let notifications = NotificationService::new(store.clone(), gate.clone(), broker.clone());
        let matching = MatchStateMachine::new(store.clone(), gate.clone(), notifications.clone());
        let chat = ChatService::new(store.clone(), gate.clone(), notifications.clone(), broker.clone(), settings.chat);
        let visits = VisitLog::new(store.clone(), gate.clone(), notifications.clone());
        Self {
            store,
            broker,
            gate,
            matching,
            notifications,
            chat,
            visits,
            settings,
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn gate(&self) -> &BlockGate {
        &self.gate
    }

    pub fn matching(&self) -> &MatchStateMachine {
        &self.matching
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    // --- Likes and matches ---

    pub async fn like(&self, actor: Uuid, target: Uuid) -> AppResult<Relationship> {
        self.matching.like(actor, target).await
    }

    pub async fn dislike(&self, actor: Uuid, target: Uuid) -> AppResult<Relationship> {
        self.matching.dislike(actor, target).await
    }

    pub async fn unlike(&self, actor: Uuid, target: Uuid) -> AppResult<Relationship> {
        self.matching.unlike(actor, target).await
    }

    pub fn relationship(&self, user: Uuid, target: Uuid) -> AppResult<Relationship> {
        self.matching.relationship(user, target)
    }

    pub fn list_matches(&self, user: Uuid) -> AppResult<Vec<Uuid>> {
        self.matching.list_matches(user)
    }

    pub fn list_likers(&self, user: Uuid) -> AppResult<Vec<Like>> {
        self.matching.list_likers(user)
    }

    // --- Blocks ---

    pub fn block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<Block> {
        self.gate.block(blocker, blocked)
    }

    pub fn unblock(&self, blocker: Uuid, blocked: Uuid) -> AppResult<()> {
        self.gate.unblock(blocker, blocked)
    }

    pub fn list_blocked(&self, blocker: Uuid) -> AppResult<Vec<Block>> {
        self.gate.list_blocked(blocker)
    }

    // --- Discovery ---

    pub fn search_profiles(
        &self,
        requester: Uuid,
        filter: Option<&serde_json::Value>,
        sort: Option<&serde_json::Value>,
        limit: Option<i64>,
    ) -> AppResult<Vec<DiscoveredProfile>> {
        let me = self
            .store
            .get_profile(requester)?
            .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))?;

        let plan = discovery::compile(&me, filter, sort, limit, self.settings.discovery)?;
        let results = self.store.search_profiles(&plan)?;
        tracing::debug!(requester = %requester, results = results.len(), "discovery search");

        Ok(results
            .into_iter()
            .map(|scored| {
                let online = self.broker.is_online(scored.profile.id);
                DiscoveredProfile::new(scored, online)
            })
            .collect())
    }

    // --- Chat ---

    pub fn send_chat_message(&self, sender: Uuid, receiver: Uuid, message: &str) -> AppResult<ChatMessage> {
        self.chat.send(sender, receiver, message)
    }

    pub fn find_chat_history(
        &self,
        user: Uuid,
        peer: Uuid,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> AppResult<CursorPage<ChatMessage>> {
        self.chat.history(user, peer, before, limit)
    }

    // --- Visits ---

    pub fn record_visit(&self, visitor: Uuid, visited: Uuid) -> AppResult<Visit> {
        self.visits.record(visitor, visited)
    }

    pub fn list_visitors(&self, user: Uuid, params: &PaginationParams) -> AppResult<Paginated<Visit>> {
        self.visits.visitors(user, params)
    }

    // --- Notification inbox ---

    pub fn list_notifications(&self, user: Uuid, params: &PaginationParams) -> AppResult<Paginated<NotificationView>> {
        self.notifications.list(user, params)
    }

    pub fn unread_count(&self, user: Uuid) -> AppResult<i64> {
        self.notifications.unread_count(user)
    }

    pub fn mark_read(&self, user: Uuid, notification_id: Uuid) -> AppResult<NotificationView> {
        self.notifications.mark_read(user, notification_id)
    }

    pub fn mark_all_read(&self, user: Uuid) -> AppResult<usize> {
        self.notifications.mark_all_read(user)
    }

    // --- Realtime lifecycle ---

    /// Attach an authenticated connection, join its user room, greet it and
    /// start replaying whatever is still pending for the user.
    pub fn on_connect(&self, user: Uuid, connection: &ConnectionId) -> Session {
        let outbound = self.broker.attach(connection);
        self.broker.join(connection, &Room::user(user));
        self.broker
            .emit_to(connection, RealtimeMessage::new(CONNECTED_EVENT, ConnectedPayload { user_id: user }));

        tracing::info!(user_id = %user, connection = %connection, "realtime connection attached");

        let replay = self.notifications.replay_pending(user);
        Session { outbound, replay }
    }

    /// Handle one inbound chat frame. Failures are reported to the sending
    /// connection; a blocked pair gets `messaging-not-allowed` instead.
    pub fn on_chat_message(
        &self,
        sender: Uuid,
        connection: &ConnectionId,
        payload: serde_json::Value,
    ) -> AppResult<ChatMessage> {
        let payload = match serde_json::from_value::<ChatPayload>(payload) {
            Ok(payload) => payload,
            Err(e) => {
                let error = AppError::new(ErrorCode::ValidationError, format!("invalid chat payload: {e}"));
                self.report_error(connection, &error);
                return Err(error);
            }
        };

        let result = self.chat.send(sender, payload.receiver_id, &payload.message);
        match &result {
            Ok(_) => {}
            Err(e) if e.code() == ErrorCode::MessagingNotAllowed => {
                self.broker
                    .emit_to(connection, ChatService::blocked_signal(payload.receiver_id));
            }
            Err(e) => self.report_error(connection, e),
        }
        result
    }

    pub fn on_mark_read(&self, user: Uuid, connection: &ConnectionId, payload: serde_json::Value) {
        let result = serde_json::from_value::<MarkReadPayload>(payload)
            .map_err(|e| AppError::new(ErrorCode::ValidationError, format!("invalid mark-read payload: {e}")))
            .and_then(|p| self.notifications.mark_read(user, p.notification_id));
        if let Err(e) = result {
            self.report_error(connection, &e);
        }
    }

    pub fn on_heartbeat(&self, user: Uuid) {
        if let Err(e) = self.store.touch_last_seen(user, Utc::now()) {
            tracing::warn!(error = %e, user_id = %user, "failed to refresh last_seen_at");
        }
    }

    pub fn on_disconnect(&self, user: Uuid, connection: &ConnectionId) {
        self.broker.leave(connection, &Room::user(user));
        self.broker.detach(connection);
        if let Err(e) = self.store.touch_last_seen(user, Utc::now()) {
            tracing::warn!(error = %e, user_id = %user, "failed to record last_seen_at");
        }
        tracing::info!(user_id = %user, connection = %connection, "realtime connection detached");
    }

    fn report_error(&self, connection: &ConnectionId, error: &AppError) {
        match error {
            AppError::Internal(_) | AppError::Database(_) => {
                tracing::error!(error = %error, connection = %connection, "realtime handler failed")
            }
            _ => tracing::debug!(error = %error, connection = %connection, "realtime request rejected"),
        }
        let detail = ApiErrorDetail {
            code: error.code().code().to_string(),
            message: error.public_message(),
            details: error.details().cloned(),
        };
        self.broker.emit_to(connection, RealtimeMessage::new(ERROR_EVENT, detail));
    }
}
