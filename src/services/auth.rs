use crate::{
    error::{AppError, Result},
    models::user::User,
    services::store::Store,
    state::AppState,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    headers::{authorization::Bearer, Authorization},
    http::request::Parts,
    RequestPartsExt, TypedHeader,
};
use std::sync::Arc;
use tracing::debug;

/// 认证服务
///
/// 把不透明的 bearer 令牌解析为用户身份。令牌的签发和失效
/// 归上游认证层所有，这里只做只读查询。
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// 令牌换用户；缺失或未知的令牌一律拒绝
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        if token.is_empty() {
            return Err(AppError::unauthorized("Missing token"));
        }

        match self.store.user_by_token(token).await? {
            Some(user) => {
                debug!("Authenticated user '{}' from token", user.username);
                Ok(user)
            }
            None => Err(AppError::unauthorized("Invalid or unknown token")),
        }
    }
}

/// HTTP 端点用的认证提取器（Authorization: Bearer <token>）
/// WebSocket 握手走查询参数，不经过这里
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::unauthorized("Missing bearer token"))?;

        let user = state.auth_service.authenticate(bearer.token()).await?;
        Ok(AuthUser(user))
    }
}
