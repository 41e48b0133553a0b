use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    auth::{AuthError, extract_token},
    error::AppError,
    models::Role,
};

/// 已认证的调用方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
}

/// 认证阶段的结果，写入请求扩展供后续阶段使用
#[derive(Debug, Clone)]
pub enum Authentication {
    Anonymous,
    Authenticated(Principal),
    Rejected(AuthError),
}

impl Authentication {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Authentication::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }
}

/// 管道第一阶段：识别调用方
///
/// 不在这里拒绝请求，登录等公开接口即使带着过期 cookie 也要能访问；
/// 需要身份的接口通过 `Principal` 提取器返回 401。
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let authentication = match extract_token(req.headers()) {
        None => Authentication::Anonymous,
        Some(token) => match state.tokens.verify(&token) {
            Ok(username) => Authentication::Authenticated(Principal { username }),
            Err(e) => {
                // Expired / InvalidSignature / Malformed 只在日志里区分
                tracing::warn!(
                    "Rejected token on {} {}: {}",
                    req.method(),
                    req.uri().path(),
                    e
                );
                Authentication::Rejected(e)
            }
        },
    };

    req.extensions_mut().insert(authentication);
    next.run(req).await
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Authentication>() {
            Some(Authentication::Authenticated(principal)) => Ok(principal.clone()),
            Some(Authentication::Rejected(e)) => Err(AppError::Unauthorized(Some(*e))),
            _ => Err(AppError::Unauthorized(None)),
        }
    }
}

/// 角色为管理员的调用方，角色以存储中的账号为准，不写进令牌
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admin(pub Principal);

impl FromRequestParts<AppState> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;
        let user = state.users.find_by_username(&principal.username).await?;

        match user.map(|u| u.role()) {
            Some(Role::Admin) => Ok(Admin(principal)),
            _ => {
                tracing::warn!(target: "audit", "FORBIDDEN {} needs admin", principal.username);
                Err(AppError::Forbidden("需要管理员权限".to_string()))
            }
        }
    }
}
