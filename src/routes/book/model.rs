use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    cache::Cacheable,
    error::AppError,
    models::{Book, BookPatch, NewBook},
    store::BookQuery,
};

const DEFAULT_PER_PAGE: u32 = 10;
const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct BookSearchParams {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub version: Option<String>,
}

impl BookSearchParams {
    pub fn to_query(&self) -> BookQuery {
        BookQuery {
            q: self.q.clone().filter(|q| !q.trim().is_empty()),
            page: self.page.unwrap_or(1).max(1),
            per_page: self
                .per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub publish_year: Option<i32>,
    pub category: Option<String>,
}

fn required(field: &str, value: Option<String>) -> Result<String, AppError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} 不能为空", field))),
    }
}

impl CreateBookRequest {
    pub fn validate(self) -> Result<NewBook, AppError> {
        Ok(NewBook {
            title: required("title", self.title)?,
            author: required("author", self.author)?,
            isbn: required("isbn", self.isbn)?,
            publish_year: self.publish_year,
            category: self.category,
        })
    }
}

/// 部分更新，未提供的字段保持不变
#[derive(Debug, Deserialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub publish_year: Option<i32>,
    pub category: Option<String>,
}

impl UpdateBookRequest {
    /// 必填字段如果出现就不能是空白
    pub fn into_patch(self) -> Result<BookPatch, AppError> {
        Ok(BookPatch {
            title: self.title.map(|v| required("title", Some(v))).transpose()?,
            author: self.author.map(|v| required("author", Some(v))).transpose()?,
            isbn: self.isbn.map(|v| required("isbn", Some(v))).transpose()?,
            publish_year: self.publish_year,
            category: self.category,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct BookListV1 {
    pub books: Vec<Book>,
    pub total: u64,
    pub pages: u64,
    pub current_page: u32,
    #[serde(skip)]
    pub last_modified: DateTime<Utc>,
}

impl Cacheable for BookListV1 {
    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

#[derive(Debug, Serialize)]
pub struct BookListV2 {
    pub status: &'static str,
    pub data: Vec<Book>,
    pub count: u64,
    pub pages: u64,
    pub current_page: u32,
    #[serde(skip)]
    pub last_modified: DateTime<Utc>,
}

impl Cacheable for BookListV2 {
    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

impl From<BookListV1> for BookListV2 {
    fn from(v1: BookListV1) -> Self {
        Self {
            status: "success",
            data: v1.books,
            count: v1.total,
            pages: v1.pages,
            current_page: v1.current_page,
            last_modified: v1.last_modified,
        }
    }
}
