use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use matcha_shared::errors::{AppError, AppResult, ErrorCode};
use matcha_shared::types::pagination::CursorPage;

use crate::gate::{reject_self, require_profile, BlockGate};
use crate::models::{ChatMessage, EntityType, NewChatMessage};
use crate::notifications::NotificationService;
use crate::realtime::{Broker, RealtimeMessage, Room};
use crate::store::RelationshipStore;

pub const CHAT_MESSAGE_EVENT: &str = "chat-message";
pub const MESSAGING_NOT_ALLOWED_EVENT: &str = "messaging-not-allowed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatBounds {
    pub min: usize,
    pub max: usize,
}

impl Default for ChatBounds {
    fn default() -> Self {
        Self { min: 1, max: 1000 }
    }
}

/// Inbound `chat-message` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    pub receiver_id: Uuid,
    pub message: String,
}

/// Trim, bound by character count, then make the text inert for HTML clients.
pub fn normalize(raw: &str, bounds: ChatBounds) -> AppResult<String> {
    let trimmed = raw.trim();
    let length = trimmed.chars().count();
    if length < bounds.min || length > bounds.max {
        return Err(AppError::with_details(
            ErrorCode::MessageLength,
            format!("message must be between {} and {} characters", bounds.min, bounds.max),
            json!({ "min": bounds.min, "max": bounds.max, "length": length }),
        ));
    }
    Ok(sanitize(trimmed))
}

/// Strip control characters (newline and tab survive) and escape `<>&"'`.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Serialize)]
struct BlockedSignal {
    receiver_id: Uuid,
    message: &'static str,
}

pub struct ChatService {
    store: Arc<dyn RelationshipStore>,
    gate: BlockGate,
    notifications: NotificationService,
    broker: Arc<dyn Broker>,
    bounds: ChatBounds,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        gate: BlockGate,
        notifications: NotificationService,
        broker: Arc<dyn Broker>,
        bounds: ChatBounds,
    ) -> Self {
        Self { store, gate, notifications, broker, bounds }
    }

    /// Persist, push to the receiver's room, then fan out a MESSAGE event.
    /// A blocked pair persists nothing.
    pub fn send(&self, sender: Uuid, receiver: Uuid, raw: &str) -> AppResult<ChatMessage> {
        reject_self(sender, receiver)?;
        let body = normalize(raw, self.bounds)?;
        require_profile(self.store.as_ref(), receiver)?;

        if self.gate.is_blocked(sender, receiver) {
            tracing::debug!(sender = %sender, receiver = %receiver, "chat message refused, pair blocked");
            return Err(AppError::new(ErrorCode::MessagingNotAllowed, "messaging this user is not allowed"));
        }

        let message = self.store.insert_chat_message(&NewChatMessage {
            sender_id: sender,
            receiver_id: receiver,
            body,
        })?;
        counter!("chat_messages_total").increment(1);

        self.broker
            .emit(&Room::user(receiver), RealtimeMessage::new(CHAT_MESSAGE_EVENT, &message));

        if let Err(e) = self
            .notifications
            .create_and_send(EntityType::Message, message.id, sender, &[receiver])
        {
            tracing::error!(error = %e, message_id = %message.id, "message notification failed");
        }

        tracing::debug!(message_id = %message.id, sender = %sender, receiver = %receiver, "chat message stored");
        Ok(message)
    }

    /// The signal a refused sender gets instead of a delivery.
    pub fn blocked_signal(receiver: Uuid) -> RealtimeMessage {
        RealtimeMessage::new(
            MESSAGING_NOT_ALLOWED_EVENT,
            BlockedSignal {
                receiver_id: receiver,
                message: "messaging this user is not allowed",
            },
        )
    }

    pub fn history(
        &self,
        user: Uuid,
        peer: Uuid,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> AppResult<CursorPage<ChatMessage>> {
        reject_self(user, peer)?;
        let items = self.store.chat_history(user, peer, before, limit as i64)?;
        Ok(CursorPage::new(items, limit, |m| m.sent_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_is_escaped() {
        assert_eq!(
            sanitize("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"
        );
        assert_eq!(sanitize("fish & \"chips\""), "fish &amp; &quot;chips&quot;");
    }

    #[test]
    fn control_characters_are_stripped() {
        assert_eq!(sanitize("a\u{0}b\u{7}c\nd\te"), "abc\nd\te");
    }

    #[test]
    fn length_is_checked_after_trimming() {
        let bounds = ChatBounds { min: 1, max: 5 };
        assert_eq!(normalize("   \n ", bounds).unwrap_err().code(), ErrorCode::MessageLength);
        assert_eq!(normalize("  hello  ", bounds).unwrap(), "hello");
        assert_eq!(normalize("toolong", bounds).unwrap_err().code(), ErrorCode::MessageLength);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let bounds = ChatBounds { min: 1, max: 3 };
        assert_eq!(normalize("été", bounds).unwrap(), "été");
    }
}
