use crate::{
    config::Config,
    services::{AuthService, EventRouter, NotificationService, Store, WebSocketService},
};
use std::sync::Arc;

/// 应用程序的共享状态
/// 包含所有服务和配置的引用
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 通知存储
    pub store: Arc<dyn Store>,

    /// 认证服务
    pub auth_service: AuthService,

    /// 事件路由器（发布/订阅注册表）
    pub event_router: Arc<EventRouter>,

    /// 通知工厂
    pub notification_service: NotificationService,

    /// WebSocket 会话管理
    pub websocket_service: WebSocketService,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let event_router = Arc::new(EventRouter::new());
        let auth_service = AuthService::new(store.clone());
        let notification_service = NotificationService::new(store.clone(), event_router.clone());
        let websocket_service = WebSocketService::new(event_router.clone());

        Self {
            config,
            store,
            auth_service,
            event_router,
            notification_service,
            websocket_service,
        }
    }

    /// 检查是否为生产环境
    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }
}
