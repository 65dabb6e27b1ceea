use crate::{
    error::{AppError, Result},
    models::realtime::NotificationPayload,
    services::auth::AuthUser,
    state::AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// 权威通知接口
/// 实时通道只是尽力而为的加速器，错过推送的客户端靠这里补齐
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", post(mark_read))
        .route("/read-all", post(mark_all_read))
}

/// 获取当前用户的通知列表（按时间倒序）和未读数
/// GET /api/community/notifications
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>> {
    debug!("Listing notifications for user {}", user.id);

    let notifications = state
        .store
        .list_notifications(user.id, state.config.notifications_page_limit)
        .await?;
    let unread_count = state.store.unread_count(user.id).await?;

    let payloads: Vec<NotificationPayload> =
        notifications.iter().map(NotificationPayload::from).collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "notifications": payloads,
            "unread_count": unread_count
        }
    })))
}

/// 标记单条通知已读（幂等）
/// POST /api/community/notifications/:id/read
async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let updated = state.store.mark_read(user.id, id).await?;
    if !updated {
        return Err(AppError::not_found("Notification"));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Notification marked as read"
    })))
}

/// 全部标记已读
/// POST /api/community/notifications/read-all
async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>> {
    let updated = state.store.mark_all_read(user.id).await?;
    debug!("Marked {} notifications as read for user {}", updated, user.id);

    Ok(Json(json!({
        "success": true,
        "data": { "updated": updated }
    })))
}
