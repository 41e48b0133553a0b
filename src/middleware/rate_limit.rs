use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::time::Instant;

use crate::{
    config::Config,
    utils::{error_codes, error_to_api_response},
};

use super::Authentication;

// 内存计数器超过这个数量时清理过期窗口
const MEMORY_PRUNE_THRESHOLD: usize = 10_000;

struct Window {
    count: u32,
    resets_at: Instant,
}

enum Backend {
    Redis(Arc<redis::Client>),
    Memory(Mutex<HashMap<String, Window>>),
}

/// 固定窗口限流，配置了 REDIS_URL 时计数放在 Redis，否则放在进程内
pub struct RateLimiter {
    backend: Backend,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn redis(redis: redis::Client, config: &Config) -> Self {
        Self {
            backend: Backend::Redis(Arc::new(redis)),
            window: config.rate_limit_window(),
            max_requests: config.rate_limit_requests,
        }
    }

    pub fn in_memory(config: &Config) -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(HashMap::new())),
            window: config.rate_limit_window(),
            max_requests: config.rate_limit_requests,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, redis::RedisError> {
        match &config.redis_url {
            Some(url) => Ok(Self::redis(redis::Client::open(url.as_str())?, config)),
            None => Ok(Self::in_memory(config)),
        }
    }

    /// 记一次请求，返回当前窗口内的计数
    pub async fn hit(&self, key: &str) -> Result<u32, redis::RedisError> {
        match &self.backend {
            Backend::Redis(redis) => {
                let key = format!("rate_limit:{}", key);
                let mut conn = redis.get_multiplexed_async_connection().await?;

                let (count,): (u32,) = window_pipeline(&key, self.window)
                    .query_async(&mut conn)
                    .await?;
                Ok(count)
            }
            Backend::Memory(windows) => {
                let now = Instant::now();
                let mut windows = windows.lock().unwrap_or_else(PoisonError::into_inner);

                if windows.len() > MEMORY_PRUNE_THRESHOLD {
                    windows.retain(|_, w| w.resets_at > now);
                }

                let window = windows.entry(key.to_string()).or_insert(Window {
                    count: 0,
                    resets_at: now + self.window,
                });
                if window.resets_at <= now {
                    window.count = 0;
                    window.resets_at = now + self.window;
                }
                window.count += 1;
                Ok(window.count)
            }
        }
    }

    pub async fn check_rate_limit(self: Arc<Self>, req: Request<Body>, next: Next) -> Response {
        let key = client_key(&req);

        match self.hit(&key).await {
            Ok(count) if count > self.max_requests => {
                tracing::warn!(target: "audit", "RATE LIMIT {} {}", key, req.uri().path());
                let retry_after = self.window.as_secs();
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after.to_string())],
                    error_to_api_response::<()>(
                        error_codes::RATE_LIMIT,
                        format!("请求过于频繁，请在{}秒后重试", retry_after),
                    ),
                )
                    .into_response();
            }
            Ok(_) => {}
            // 计数后端不可用时放行
            Err(e) => tracing::error!("Rate limit backend error, letting request through: {}", e),
        }

        next.run(req).await
    }
}

/// INCR 和 EXPIRE 放在同一个事务里，计数键不会丢掉过期时间
///
/// `EXPIRE ... NX` 只在键没有过期时间时生效，窗口从第一次请求开始计时。
fn window_pipeline(key: &str, window: Duration) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .incr(key, 1)
        .cmd("EXPIRE")
        .arg(key)
        .arg(window.as_secs().max(1))
        .arg("NX")
        .ignore();
    pipe
}

/// 已认证时按用户计数，否则按客户端 IP
fn client_key(req: &Request<Body>) -> String {
    if let Some(principal) = req
        .extensions()
        .get::<Authentication>()
        .and_then(Authentication::principal)
    {
        return format!("user:{}", principal.username);
    }

    // 从连接信息获取原始IP
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    // 从请求头中获取IP，或者使用连接信息中的IP作为默认值
    let ip = req
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string();

    format!("ip:{}", ip)
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    limiter.check_rate_limit(req, next).await
}
