// 令牌认证
// 签发与校验无状态令牌，以及从请求中取出令牌

mod token;

pub use token::{AuthError, Claims, Token, TokenAuthenticator};

use axum::http::HeaderMap;
use axum_extra::{
    extract::cookie::CookieJar,
    headers::{Authorization, HeaderMapExt, authorization::Bearer},
};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// 从 `Authorization: Bearer` 或 `access_token` cookie 中取令牌，请求头优先
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }

    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}
