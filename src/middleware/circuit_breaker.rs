use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    config::Config,
    utils::{error_codes, error_to_api_response},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { since: Instant },
    // 半开时只放行一个试探请求
    HalfOpen { trial_started: Instant },
}

/// 熔断器：连续失败达到阈值后直接拒绝，等待 `reset_timeout` 后试探恢复
pub struct CircuitBreaker {
    fail_max: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(fail_max: u32, reset_timeout: Duration) -> Self {
        Self {
            fail_max: fail_max.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.breaker_fail_max, config.breaker_reset_timeout())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.current(), BreakerState::Open { .. })
    }

    fn current(&self) -> BreakerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 是否允许请求通过
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { since } if now.duration_since(since) >= self.reset_timeout => {
                *state = BreakerState::HalfOpen { trial_started: now };
                true
            }
            BreakerState::Open { .. } => false,
            // 试探请求被取消时不会回报结果，超时后允许再试一次
            BreakerState::HalfOpen { trial_started }
                if now.duration_since(trial_started) >= self.reset_timeout =>
            {
                *state = BreakerState::HalfOpen { trial_started: now };
                true
            }
            BreakerState::HalfOpen { .. } => false,
        }
    }

    pub fn record(&self, success: bool) {
        self.record_at(success, Instant::now());
    }

    fn record_at(&self, success: bool, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let next = match (*state, success) {
            (BreakerState::HalfOpen { .. }, true) => {
                tracing::info!("Circuit breaker closed again");
                BreakerState::Closed { failures: 0 }
            }
            (BreakerState::HalfOpen { .. }, false) => {
                tracing::warn!("Circuit breaker opened after failed trial request");
                BreakerState::Open { since: now }
            }
            (BreakerState::Closed { .. }, true) => BreakerState::Closed { failures: 0 },
            (BreakerState::Closed { failures }, false) if failures + 1 >= self.fail_max => {
                tracing::warn!("Circuit breaker opened after {} failures", failures + 1);
                BreakerState::Open { since: now }
            }
            (BreakerState::Closed { failures }, false) => BreakerState::Closed {
                failures: failures + 1,
            },
            // 打开期间不会有请求到达处理器
            (open @ BreakerState::Open { .. }, _) => open,
        };
        *state = next;
    }

    pub async fn guard(self: Arc<Self>, req: Request<Body>, next: Next) -> Response {
        if !self.try_acquire() {
            tracing::warn!("Circuit breaker open, rejecting {}", req.uri().path());
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                error_to_api_response::<()>(
                    error_codes::SERVICE_UNAVAILABLE,
                    "服务暂时不可用，请稍后重试".to_string(),
                ),
            )
                .into_response();
        }

        let response = next.run(req).await;
        self.record(!response.status().is_server_error());
        response
    }
}

pub async fn circuit_breaker(
    State(breaker): State<Arc<CircuitBreaker>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    breaker.guard(req, next).await
}
