use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::cache::Cacheable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publish_year: Option<i32>,
    pub category: Option<String>,
    pub borrowed_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Cacheable for Book {
    fn last_modified(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// 待插入的图书，id 由存储层分配
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publish_year: Option<i32>,
    pub category: Option<String>,
}

impl NewBook {
    pub fn into_book(self, id: i64, updated_at: DateTime<Utc>) -> Book {
        Book {
            id,
            title: self.title,
            author: self.author,
            isbn: self.isbn,
            publish_year: self.publish_year,
            category: self.category,
            borrowed_by: None,
            updated_at,
        }
    }
}

/// 部分更新，`None` 表示保持原值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub publish_year: Option<i32>,
    pub category: Option<String>,
}

impl BookPatch {
    pub fn apply_to(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title = title.clone();
        }
        if let Some(author) = &self.author {
            book.author = author.clone();
        }
        if let Some(isbn) = &self.isbn {
            book.isbn = isbn.clone();
        }
        if self.publish_year.is_some() {
            book.publish_year = self.publish_year;
        }
        if self.category.is_some() {
            book.category = self.category.clone();
        }
    }
}

/// 示例数据
pub fn sample_books() -> Vec<NewBook> {
    [
        ("HTTP: The Definitive Guide", "David Gourley", "978-1565925090", 2002, "Networking"),
        ("RESTful Web APIs", "Leonard Richardson", "978-1449358068", 2013, "Web Development"),
        ("Computer Networks", "Andrew Tanenbaum", "978-0132126953", 2010, "Networking"),
    ]
    .into_iter()
    .map(|(title, author, isbn, year, category)| NewBook {
        title: title.to_string(),
        author: author.to_string(),
        isbn: isbn.to_string(),
        publish_year: Some(year),
        category: Some(category.to_string()),
    })
    .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_books: usize,
    pub available_books: usize,
    pub borrowed_books: usize,
    pub categories: BTreeMap<String, usize>,
    #[serde(skip)]
    pub last_modified: DateTime<Utc>,
}

impl Statistics {
    pub fn collect(books: &[Book], last_modified: DateTime<Utc>) -> Self {
        let mut categories = BTreeMap::new();
        for book in books {
            let category = book.category.clone().unwrap_or_else(|| "Unknown".to_string());
            *categories.entry(category).or_insert(0) += 1;
        }
        let borrowed_books = books.iter().filter(|b| b.borrowed_by.is_some()).count();

        Self {
            total_books: books.len(),
            available_books: books.len() - borrowed_books,
            borrowed_books,
            categories,
            last_modified,
        }
    }
}

impl Cacheable for Statistics {
    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}
