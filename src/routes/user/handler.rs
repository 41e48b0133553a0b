use axum::{
    Json,
    extract::State,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::{
    AppState,
    auth::ACCESS_TOKEN_COOKIE,
    error::AppError,
    middleware::Principal,
    utils::{ApiResponse, success_to_api_response, verify_password},
};

use super::model::{LoginRequest, LoginResponse, LogoutResponse, MeResponse};

fn access_cookie(token: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((ACCESS_TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<LoginResponse>>), AppError> {
    let (username, password) = req.credentials()?;

    // 用户不存在和密码错误返回同样的结果，耗时也一样
    let Some(user) = state.users.find_by_username(&username).await? else {
        let _ = verify_password(&password, state.dummy_password_hash());
        tracing::warn!(target: "audit", "LOGIN FAILED {}", username);
        return Err(AppError::InvalidCredentials);
    };
    if !user.verify_login(&password)? {
        tracing::warn!(target: "audit", "LOGIN FAILED {}", username);
        return Err(AppError::InvalidCredentials);
    }

    // 生成 token
    let ttl = state.token_ttl();
    let token = state.tokens.issue(&user.username, ttl)?;
    tracing::info!(target: "audit", "LOGIN {}", user.username);

    let expires_at = token.expires_at();
    let token = token.into_string();
    let jar = jar.add(access_cookie(token.clone(), ttl.num_seconds()));

    Ok((jar, success_to_api_response(LoginResponse { token, expires_at })))
}

#[axum::debug_handler]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<ApiResponse<LogoutResponse>>) {
    let jar = jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"));
    (jar, success_to_api_response(LogoutResponse {}))
}

/// 当前令牌对应的用户
#[axum::debug_handler]
pub async fn me(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MeResponse>>, AppError> {
    let user = state
        .users
        .find_by_username(&principal.username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", principal.username)))?;

    Ok(success_to_api_response(MeResponse {
        role: user.role().as_str().to_string(),
        username: user.username,
    }))
}
