use crate::{
    error::{AppError, Result},
    state::AppState,
};
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/connect", get(websocket_handler))
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

/// WebSocket 连接处理器
/// GET /ws/connect?token=<opaque>
///
/// 令牌随升级请求的查询参数带入，在升级之前解析为用户身份。
/// 缺失或无效的令牌直接拒绝升级（401），不分配任何会话资源，
/// 也不加入任何主题；客户端需要换新令牌重连，服务端不重试。
async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let token = params.token.unwrap_or_default();

    let user = match state.auth_service.authenticate(&token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("WebSocket connection rejected: {}", e);
            return Err(AppError::unauthorized("WebSocket authentication failed"));
        }
    };

    info!("WebSocket upgrade accepted for user '{}'", user.username);

    Ok(ws.on_upgrade(move |socket| async move {
        state.websocket_service.handle_connection(socket, user).await;
    }))
}
