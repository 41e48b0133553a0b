//! Concurrent writes against a store with network-like latency.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::*;
use library_api::{
    AppState,
    clock::{Clock, ManualClock},
    models::{Book, BookPatch, NewBook},
    store::{BookQuery, BookStore, MemoryStore, StoreError},
};

const LATENCY: Duration = Duration::from_millis(30);

/// 每次调用先等一会儿，让并发请求的读写交错
struct SlowStore {
    inner: MemoryStore,
}

#[async_trait]
impl BookStore for SlowStore {
    async fn search(&self, query: &BookQuery) -> Result<(Vec<Book>, u64), StoreError> {
        self.inner.search(query).await
    }

    async fn all(&self) -> Result<Vec<Book>, StoreError> {
        self.inner.all().await
    }

    async fn read(&self, id: i64) -> Result<Book, StoreError> {
        tokio::time::sleep(LATENCY).await;
        self.inner.read(id).await
    }

    async fn insert(&self, book: NewBook, at: DateTime<Utc>) -> Result<Book, StoreError> {
        self.inner.insert(book, at).await
    }

    async fn update(&self, id: i64, patch: &BookPatch) -> Result<(), StoreError> {
        tokio::time::sleep(LATENCY).await;
        self.inner.update(id, patch).await
    }

    async fn set_borrower(
        &self,
        id: i64,
        expected: Option<&str>,
        borrower: Option<&str>,
    ) -> Result<bool, StoreError> {
        tokio::time::sleep(LATENCY).await;
        self.inner.set_borrower(id, expected, borrower).await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn touch(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.touch(id, at).await
    }

    async fn last_modified(&self) -> Result<DateTime<Utc>, StoreError> {
        self.inner.last_modified().await
    }
}

fn create_slow_app() -> TestApp {
    let config = test_config();
    let clock = Arc::new(ManualClock::new(start_time()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();

    let users = Arc::new(MemoryStore::seeded(config.bcrypt_cost, start_time()).unwrap());
    let books = Arc::new(SlowStore {
        inner: MemoryStore::seeded(config.bcrypt_cost, start_time()).unwrap(),
    });

    app_from_state(AppState::new(config, books, users, dyn_clock), clock)
}

#[tokio::test]
async fn test_simultaneous_borrows_grant_one_loan() {
    let app = create_slow_app();
    let user1 = app.login("user1", "pass123").await;
    let user2 = app.login("user2", "pass456").await;

    let (first, second) = tokio::join!(
        app.send(authed("POST", "/api/books/1/borrow", &user1, None)),
        app.send(authed("POST", "/api/books/1/borrow", &user2, None)),
    );

    let mut statuses = [first.status(), second.status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::BAD_REQUEST]);

    let winner = if first.status() == StatusCode::OK { "user1" } else { "user2" };
    let response = app.send(get("/api/books/1")).await;
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["borrowed_by"], winner);
}

#[tokio::test]
async fn test_update_during_borrow_keeps_the_loan() {
    let app = create_slow_app();
    let admin = app.login("admin", "admin123").await;
    let user1 = app.login("user1", "pass123").await;

    let (update, borrow) = tokio::join!(
        app.send(authed(
            "PUT",
            "/api/books/2",
            &admin,
            Some(r#"{"title":"RESTful Web APIs, Revised"}"#),
        )),
        app.send(authed("POST", "/api/books/2/borrow", &user1, None)),
    );
    assert_eq!(update.status(), StatusCode::OK);
    assert_eq!(borrow.status(), StatusCode::OK);

    let response = app.send(get("/api/books/2")).await;
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["title"], "RESTful Web APIs, Revised");
    assert_eq!(json["borrowed_by"], "user1");
}

#[tokio::test]
async fn test_simultaneous_returns_release_once() {
    let app = create_slow_app();
    let user1 = app.login("user1", "pass123").await;

    let response = app.send(authed("POST", "/api/books/3/borrow", &user1, None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (first, second) = tokio::join!(
        app.send(authed("POST", "/api/books/3/return", &user1, None)),
        app.send(authed("POST", "/api/books/3/return", &user1, None)),
    );

    let mut statuses = [first.status(), second.status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::BAD_REQUEST]);
}
