use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower::ServiceBuilder;

use crate::{
    AppState,
    middleware::{
        CircuitBreaker, RateLimiter, authenticate, cache_annotate, circuit_breaker, log_errors,
        rate_limit,
    },
};

pub mod board;
pub mod book;
pub mod health;
pub mod user;
pub mod version;

/// 组装路由和请求管道
///
/// 管道顺序：authenticate → rate_limit → circuit_breaker → handler → cache_annotate
pub fn create_router(
    state: AppState,
    rate_limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
) -> Router {
    let api = Router::new()
        .route("/", get(version::versions))
        // 用户路由
        .route("/login", post(user::login))
        .route("/logout", post(user::logout))
        .route("/me", get(user::me))
        // 图书路由
        .route("/books", get(book::list_books).post(book::create_book))
        .route("/books/statistics", get(book::statistics))
        .route(
            "/books/{id}",
            get(book::get_book)
                .put(book::update_book)
                .delete(book::delete_book),
        )
        .route("/books/{id}/borrow", post(book::borrow_book))
        .route("/books/{id}/return", post(book::return_book))
        // 按路径区分版本
        .route("/v1/books", get(book::list_books_v1))
        .route("/v2/books", get(book::list_books_v2))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(breaker, circuit_breaker))
                .layer(from_fn(cache_annotate)),
        );

    let base = state.config.api_base_uri.trim_end_matches('/').to_string();
    let router = Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(board::board));
    let router = if base.is_empty() {
        router.merge(api)
    } else {
        router.nest(&base, api)
    };

    router
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(log_errors))
                .layer(from_fn_with_state(state.clone(), authenticate))
                .layer(from_fn_with_state(rate_limiter, rate_limit)),
        )
        .with_state(state)
}
