use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use vanished_shared::constants::{APP_NAME, MAX_LINE_LEN};

use crate::connection;
use crate::error::ServerError;
use crate::state::AppState;
use crate::transport::WsTransport;

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info));

    if state.config.ws_enabled {
        router = router.route("/ws", get(ws_upgrade));
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: &'static str,
    version: &'static str,
    sessions: usize,
    max_connections: usize,
    default_max_users: u32,
    max_room_users: u32,
    websocket: bool,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: APP_NAME,
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.registry.len().await,
        max_connections: state.config.max_connections,
        default_max_users: state.config.default_max_users,
        max_room_users: state.config.max_room_users,
        websocket: state.config.ws_enabled,
    })
}

/// Upgrade to the WebSocket transport. Admission runs before upgrading, so
/// a rate-limited peer gets 429 and a full server 503 instead of an
/// accepted-then-closed socket.
async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let permit = state.gate.admit(peer).await?;

    Ok(ws
        .max_message_size(MAX_LINE_LEN)
        .on_upgrade(move |socket| async move {
            let (transport, source) = WsTransport::new(socket, peer);
            connection::run(state, Arc::new(transport), source).await;
            drop(permit);
        }))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestServer;

    #[tokio::test]
    async fn info_reports_live_sessions() {
        let server = TestServer::new();
        let _alice = server.connect("alice").await;

        let Json(info) = server_info(State(server.state.clone())).await;
        assert_eq!(info.sessions, 1);
        assert_eq!(info.default_max_users, 10);
        assert!(info.websocket);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let Json(health) = health_check().await;
        assert_eq!(health.status, "ok");
    }
}
