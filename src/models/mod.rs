pub mod content;
pub mod notification;
pub mod realtime;
pub mod user;
