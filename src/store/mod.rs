// 存储层
// 图书和用户的持久化接口，通过 AppState 注入，不使用全局单例

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Book, BookPatch, NewBook, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

impl StoreError {
    pub fn book_not_found(id: i64) -> Self {
        StoreError::NotFound(format!("book {}", id))
    }
}

/// 图书查询条件，`page` 从 1 开始
#[derive(Debug, Clone)]
pub struct BookQuery {
    pub q: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl BookQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

#[async_trait]
pub trait BookStore: Send + Sync {
    /// 按标题或作者模糊搜索（不区分大小写），返回当前页和总数
    async fn search(&self, query: &BookQuery) -> Result<(Vec<Book>, u64), StoreError>;

    async fn all(&self) -> Result<Vec<Book>, StoreError>;

    async fn read(&self, id: i64) -> Result<Book, StoreError>;

    async fn insert(&self, book: NewBook, at: DateTime<Utc>) -> Result<Book, StoreError>;

    /// 只修改补丁里给出的字段，借阅状态不受影响
    async fn update(&self, id: i64, patch: &BookPatch) -> Result<(), StoreError>;

    /// 比较并设置借阅人：当前借阅人等于 `expected` 时改为 `borrower`
    ///
    /// 检查和写入是一次原子操作。返回 `false` 表示当前借阅人已经不是 `expected`。
    async fn set_borrower(
        &self,
        id: i64,
        expected: Option<&str>,
        borrower: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    /// 记录一次变更时间；资源已删除时只更新集合的时间
    async fn touch(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// 整个集合最近一次变更的时间
    async fn last_modified(&self) -> Result<DateTime<Utc>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}

/// 示例账号：(用户名, 密码, 角色)
pub const SAMPLE_USERS: [(&str, &str, &str); 3] = [
    ("admin", "admin123", "admin"),
    ("user1", "pass123", "user"),
    ("user2", "pass456", "user"),
];
