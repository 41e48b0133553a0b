//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use chrono::{DateTime, TimeZone, Utc};
use library_api::{
    AppState,
    clock::{Clock, ManualClock},
    config::Config,
    middleware::{CircuitBreaker, RateLimiter},
    routes::create_router,
};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn test_config() -> Config {
    Config {
        jwt_secret: "integration-test-secret".to_string(),
        // 测试里不需要真实的哈希强度
        bcrypt_cost: 4,
        ..Config::default()
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(test_config())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    let clock = Arc::new(ManualClock::new(start_time()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let state = AppState::in_memory(config, dyn_clock).unwrap();
    app_from_state(state, clock)
}

/// 自定义存储时使用
pub fn app_from_state(state: AppState, clock: Arc<ManualClock>) -> TestApp {
    let rate_limiter = Arc::new(RateLimiter::in_memory(&state.config));
    let breaker = Arc::new(CircuitBreaker::from_config(&state.config));

    TestApp {
        router: create_router(state.clone(), rate_limiter, breaker),
        state,
        clock,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .send(json_request(
                "POST",
                "/api/login",
                &format!(r#"{{"username":"{}","password":"{}"}}"#, username, password),
            ))
            .await;
        assert_eq!(response.status(), 200, "login as {} failed", username);

        let json = body_to_json(response.into_body()).await;
        json["resp_data"]["token"].as_str().unwrap().to_string()
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with(uri: &str, name: header::HeaderName, value: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(name, value)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed(method: &str, uri: &str, token: &str, body: Option<&str>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn header_str<'a>(response: &'a Response<Body>, name: header::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub async fn body_bytes(body: Body) -> Vec<u8> {
    axum::body::to_bytes(body, usize::MAX).await.unwrap().to_vec()
}

pub async fn body_to_json(body: Body) -> Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}
