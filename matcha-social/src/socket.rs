use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use socketioxide::extract::{Data, SocketRef};
use tokio::sync::mpsc;
use uuid::Uuid;

use matcha_shared::types::auth::verify_token;

use crate::engine::ERROR_EVENT;
use crate::realtime::{ConnectionId, Outbound};
use crate::AppState;

#[derive(Debug, Serialize)]
struct ErrorPayload {
    code: String,
    message: String,
}

pub async fn on_connect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match authenticate_socket(&socket, &state) {
        Ok(id) => id,
        Err(msg) => {
            tracing::warn!(error = %msg, sid = %socket.id, "socket auth failed");
            let _ = socket.emit(
                ERROR_EVENT,
                &ErrorPayload {
                    code: "AUTH_FAILED".into(),
                    message: msg,
                },
            );
            socket.disconnect().ok();
            return;
        }
    };

    socket.extensions.insert(user_id);
    let connection: ConnectionId = socket.id.to_string();

    let session = state.engine.on_connect(user_id, &connection);
    let ack_timeout = state.config.engine_settings().push_ack_timeout;
    tokio::spawn(forward(socket.clone(), session.outbound, ack_timeout));

    socket.on("chat-message", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                let Some(user_id) = socket.extensions.get::<Uuid>() else { return };
                let connection = socket.id.to_string();
                // Failures were already reported on this socket.
                let _ = state.engine.on_chat_message(user_id, &connection, payload);
            }
        }
    });

    socket.on("mark-read", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                let Some(user_id) = socket.extensions.get::<Uuid>() else { return };
                state.engine.on_mark_read(user_id, &socket.id.to_string(), payload);
            }
        }
    });

    socket.on("heartbeat", {
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                if let Some(user_id) = socket.extensions.get::<Uuid>() {
                    state.engine.on_heartbeat(user_id);
                }
            }
        }
    });

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                if let Some(user_id) = socket.extensions.get::<Uuid>() {
                    state.engine.on_disconnect(user_id, &socket.id.to_string());
                }
            }
        }
    });
}

/// Drain one connection's outbound queue onto the socket. Messages carrying
/// an ack slot are emitted with a client acknowledgment; the slot is filled
/// with whether the client answered in time.
async fn forward(socket: SocketRef, mut outbound: mpsc::UnboundedReceiver<Outbound>, ack_timeout: Duration) {
    while let Some(Outbound { message, ack }) = outbound.recv().await {
        match ack {
            None => {
                if let Err(e) = socket.emit(message.event.clone(), &message.payload) {
                    tracing::debug!(error = %e, sid = %socket.id, event = %message.event, "emit failed");
                }
            }
            Some(ack) => {
                let pending = socket
                    .timeout(ack_timeout)
                    .emit_with_ack::<_, serde_json::Value>(message.event.clone(), &message.payload);
                match pending {
                    Ok(stream) => {
                        tokio::spawn(async move { ack.report(stream.await.is_ok()) });
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, sid = %socket.id, event = %message.event, "emit failed");
                        ack.report(false);
                    }
                }
            }
        }
    }
    tracing::debug!(sid = %socket.id, "outbound queue closed");
}

fn authenticate_socket(socket: &SocketRef, state: &Arc<AppState>) -> Result<Uuid, String> {
    let connect_info = socket.req_parts();

    // ?token=xxx
    let query = connect_info.uri.query().unwrap_or_default();
    let token = token_from_query(query).ok_or_else(|| "missing token query parameter".to_string())?;

    verify_token(&token, &state.config.jwt_secret)
        .map(|claims| claims.sub)
        .map_err(|e| e.public_message())
}

fn token_from_query(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let mut split = pair.splitn(2, '=');
        let key = split.next()?;
        let value = split.next()?;
        (key == "token" && !value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_read_from_the_query_string() {
        assert_eq!(token_from_query("EIO=4&token=abc.def&transport=websocket").as_deref(), Some("abc.def"));
        assert_eq!(token_from_query("EIO=4&transport=polling"), None);
        assert_eq!(token_from_query("token="), None);
    }
}
