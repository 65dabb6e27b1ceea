pub mod auth;
pub mod notification;
pub mod realtime;
pub mod store;
pub mod websocket;

// 重新导出常用类型
pub use auth::AuthService;
pub use notification::NotificationService;
pub use realtime::EventRouter;
pub use store::{PgStore, Store};
pub use websocket::WebSocketService;
