pub mod chat;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod gate;
pub mod matching;
pub mod models;
pub mod notifications;
pub mod realtime;
pub mod routes;
pub mod schema;
pub mod socket;
pub mod store;
pub mod visits;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use config::AppConfig;
use engine::SocialEngine;
use store::PgStore;

pub struct AppState {
    pub engine: Arc<SocialEngine>,
    pub config: AppConfig,
    /// Present when running against PostgreSQL; probed by `/health`.
    pub database: Option<Arc<PgStore>>,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// HTTP routes. The binary adds the Socket.IO, CORS and trace layers.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        // Likes and matches
        .route("/likes/:id", post(routes::likes::like).delete(routes::likes::unlike))
        .route("/dislikes/:id", post(routes::likes::dislike))
        .route("/relationships/:id", get(routes::likes::relationship))
        .route("/matches", get(routes::likes::list_matches))
        .route("/likers", get(routes::likes::list_likers))
        // Blocks
        .route("/blocks", get(routes::blocks::list_blocked))
        .route("/blocks/:id", post(routes::blocks::block).delete(routes::blocks::unblock))
        // Discovery
        .route("/discovery/search", post(routes::discovery::search))
        // Chat
        .route("/chat/:id", get(routes::chat::history).post(routes::chat::send_message))
        // Visits
        .route("/visits", get(routes::visits::list_visitors))
        .route("/visits/:id", post(routes::visits::record_visit))
        // Notifications
        .route("/notifications", get(routes::notifications::list_notifications))
        .route("/notifications/unread-count", get(routes::notifications::unread_count))
        .route("/notifications/mark-all-read", post(routes::notifications::mark_all_read))
        .route("/notifications/:id/read", post(routes::notifications::mark_read))
        .layer(axum::middleware::from_fn(matcha_shared::middleware::metrics_middleware))
}
