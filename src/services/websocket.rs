use crate::{
    models::{realtime::Topic, user::User},
    services::realtime::EventRouter,
};
use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// WebSocket 会话管理器
///
/// 每个连接一个会话：认证在升级之前完成（见 routes::websocket），
/// 进到这里的连接已经持有已解析的用户身份。会话固定加入
/// 自己的私有主题和全局主题，接收循环只用于探测断开，
/// 不处理任何入站指令。
#[derive(Clone)]
pub struct WebSocketService {
    router: Arc<EventRouter>,
}

impl WebSocketService {
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self { router }
    }

    /// 处理一条已认证的连接，直到它断开
    pub async fn handle_connection(&self, socket: WebSocket, user: User) {
        let session_id = format!("sess_{}", uuid::Uuid::new_v4());
        let user_topic = Topic::User(user.id).name();
        let global_topic = Topic::Global.name();

        info!(
            "WebSocket session {} connected for user '{}', joining '{}' and '{}'",
            session_id, user.username, user_topic, global_topic
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        self.router.join(&user_topic, &session_id, tx.clone());
        self.router.join(&global_topic, &session_id, tx);

        let (mut ws_tx, mut ws_rx) = socket.split();

        // 出站任务：把路由器投递的消息原样转发给客户端
        let send_session_id = session_id.clone();
        let send_task = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = ws_tx.send(Message::Text(text)).await {
                    warn!("Send failed on session {}: {}", send_session_id, e);
                    break;
                }
            }
            debug!("Send task ended for session: {}", send_session_id);
        });

        // 接收循环：入站帧一律忽略，只等关闭或传输错误
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Close(_)) => {
                    info!("WebSocket session closed: {}", session_id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error on session {}: {}", session_id, e);
                    break;
                }
            }
        }

        // 退订后注册表里的发送端被丢弃，出站任务随之退出；
        // 与此同时仍在途的发布按尽力而为语义静默丢给已关闭的队列
        self.router.leave(&user_topic, &session_id);
        self.router.leave(&global_topic, &session_id);
        let _ = send_task.await;

        info!("WebSocket session {} cleaned up for user '{}'", session_id, user.username);
    }
}
