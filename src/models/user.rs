use serde::{Deserialize, Serialize};

/// 社区用户的轻量引用
/// 由上游业务层在事件提交后一并传入，这里不做任何用户管理
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub picture: Option<String>,
}

impl User {
    pub fn new(id: i64, username: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            picture: None,
        }
    }
}
