use std::sync::Arc;

use socketioxide::SocketIo;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use matcha_shared::clients::db::create_pool;
use matcha_shared::middleware::{init_metrics, init_tracing, JWT_SECRET_ENV};
use matcha_social::config::AppConfig;
use matcha_social::engine::SocialEngine;
use matcha_social::realtime::RoomHub;
use matcha_social::store::PgStore;
use matcha_social::{router, socket, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("matcha-social");

    let config = AppConfig::load()?;
    let port = config.port;
    // The HTTP bearer extractor reads the signing secret from the environment.
    std::env::set_var(JWT_SECRET_ENV, &config.jwt_secret);

    let pool = create_pool(&config.database_url, config.db_pool_size, config.db_connection_timeout())?;
    let database = Arc::new(PgStore::new(pool));

    let settings = config.engine_settings();
    let hub = Arc::new(RoomHub::new(settings.push_ack_timeout));
    let engine = Arc::new(SocialEngine::new(database.clone(), hub, settings));

    let metrics_handle = init_metrics()?;

    let (sio_layer, io) = SocketIo::builder().build_layer();

    let state = Arc::new(AppState {
        engine,
        config,
        database: Some(database),
        metrics_handle: Some(metrics_handle),
    });

    io.ns("/", {
        let state = state.clone();
        move |socket: socketioxide::extract::SocketRef| {
            let state = state.clone();
            async move {
                socket::on_connect_with_state(socket, state).await;
            }
        }
    });

    let app = router()
        .layer(sio_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "matcha-social starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
