use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{BookQuery, BookStore, SAMPLE_USERS, StoreError, UserStore};
use crate::models::{Book, BookPatch, NewBook, User, sample_books};
use crate::utils::hash_password;

struct Catalogue {
    books: BTreeMap<i64, Book>,
    next_id: i64,
    last_modified: DateTime<Utc>,
}

/// 进程内存储，读写由 RwLock 串行化
pub struct MemoryStore {
    catalogue: RwLock<Catalogue>,
    users: HashMap<String, User>,
}

impl MemoryStore {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            catalogue: RwLock::new(Catalogue {
                books: BTreeMap::new(),
                next_id: 1,
                last_modified: now,
            }),
            users: HashMap::new(),
        }
    }

    /// 带示例图书和示例账号的存储
    pub fn seeded(bcrypt_cost: u32, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let mut books = BTreeMap::new();
        for (idx, book) in sample_books().into_iter().enumerate() {
            let id = idx as i64 + 1;
            books.insert(id, book.into_book(id, now));
        }

        let mut users = HashMap::new();
        for (username, password, role) in SAMPLE_USERS {
            let user = User {
                username: username.to_string(),
                password_hash: hash_password(password, bcrypt_cost)?,
                role: role.to_string(),
            };
            users.insert(user.username.clone(), user);
        }

        Ok(Self {
            catalogue: RwLock::new(Catalogue {
                next_id: books.len() as i64 + 1,
                books,
                last_modified: now,
            }),
            users,
        })
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn search(&self, query: &BookQuery) -> Result<(Vec<Book>, u64), StoreError> {
        let catalogue = self.catalogue.read().await;
        let needle = query.q.as_deref().map(str::to_lowercase);

        let matched: Vec<&Book> = catalogue
            .books
            .values()
            .filter(|book| match &needle {
                Some(needle) => {
                    book.title.to_lowercase().contains(needle)
                        || book.author.to_lowercase().contains(needle)
                }
                None => true,
            })
            .collect();

        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.per_page as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn all(&self) -> Result<Vec<Book>, StoreError> {
        Ok(self.catalogue.read().await.books.values().cloned().collect())
    }

    async fn read(&self, id: i64) -> Result<Book, StoreError> {
        self.catalogue
            .read()
            .await
            .books
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::book_not_found(id))
    }

    async fn insert(&self, book: NewBook, at: DateTime<Utc>) -> Result<Book, StoreError> {
        let mut catalogue = self.catalogue.write().await;
        let id = catalogue.next_id;
        catalogue.next_id += 1;

        let book = book.into_book(id, at);
        catalogue.books.insert(id, book.clone());
        Ok(book)
    }

    async fn update(&self, id: i64, patch: &BookPatch) -> Result<(), StoreError> {
        let mut catalogue = self.catalogue.write().await;
        let book = catalogue
            .books
            .get_mut(&id)
            .ok_or_else(|| StoreError::book_not_found(id))?;
        patch.apply_to(book);
        Ok(())
    }

    async fn set_borrower(
        &self,
        id: i64,
        expected: Option<&str>,
        borrower: Option<&str>,
    ) -> Result<bool, StoreError> {
        // 同一个写锁内完成比较和修改
        let mut catalogue = self.catalogue.write().await;
        let book = catalogue
            .books
            .get_mut(&id)
            .ok_or_else(|| StoreError::book_not_found(id))?;

        if book.borrowed_by.as_deref() != expected {
            return Ok(false);
        }
        book.borrowed_by = borrower.map(str::to_string);
        Ok(true)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.catalogue
            .write()
            .await
            .books
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::book_not_found(id))
    }

    async fn touch(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut catalogue = self.catalogue.write().await;
        if let Some(book) = catalogue.books.get_mut(&id) {
            book.updated_at = at;
        }
        catalogue.last_modified = at;
        Ok(())
    }

    async fn last_modified(&self) -> Result<DateTime<Utc>, StoreError> {
        Ok(self.catalogue.read().await.last_modified)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(username).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> MemoryStore {
        MemoryStore::seeded(4, Utc::now()).unwrap()
    }

    fn query(q: Option<&str>, page: u32, per_page: u32) -> BookQuery {
        BookQuery {
            q: q.map(str::to_string),
            page,
            per_page,
        }
    }

    #[tokio::test]
    async fn seeded_with_books_and_users() {
        let store = store();
        assert_eq!(store.all().await.unwrap().len(), 3);

        let admin = store.find_by_username("admin").await.unwrap().unwrap();
        assert!(admin.verify_login("admin123").unwrap());
        assert!(!admin.verify_login("wrong").unwrap());
        assert!(store.find_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_paginated() {
        let store = store();

        let (books, total) = store.search(&query(Some("richardson"), 1, 10)).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(books[0].title, "RESTful Web APIs");

        let (page_two, total) = store.search(&query(None, 2, 2)).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page_two.len(), 1);
        assert_eq!(page_two[0].id, 3);
    }

    #[tokio::test]
    async fn missing_book_is_not_found() {
        let store = store();
        assert!(matches!(store.read(99).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(99).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update(99, &BookPatch::default()).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.set_borrower(99, None, Some("user1")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn set_borrower_compares_before_setting() {
        let store = store();

        assert!(store.set_borrower(1, None, Some("user1")).await.unwrap());
        assert!(!store.set_borrower(1, None, Some("user2")).await.unwrap());
        assert_eq!(store.read(1).await.unwrap().borrowed_by.as_deref(), Some("user1"));

        assert!(!store.set_borrower(1, Some("user2"), None).await.unwrap());
        assert!(store.set_borrower(1, Some("user1"), None).await.unwrap());
        assert_eq!(store.read(1).await.unwrap().borrowed_by, None);
    }

    #[tokio::test]
    async fn concurrent_borrowers_get_one_loan() {
        let store = std::sync::Arc::new(store());

        let tasks: Vec<_> = ["user1", "user2", "admin"]
            .into_iter()
            .map(|who| {
                let store = store.clone();
                tokio::spawn(async move { store.set_borrower(2, None, Some(who)).await.unwrap() })
            })
            .collect();

        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn update_leaves_borrower_alone() {
        let store = store();
        store.set_borrower(1, None, Some("user1")).await.unwrap();

        let patch = BookPatch {
            title: Some("Renamed".into()),
            ..BookPatch::default()
        };
        store.update(1, &patch).await.unwrap();

        let book = store.read(1).await.unwrap();
        assert_eq!(book.title, "Renamed");
        assert_eq!(book.author, "David Gourley");
        assert_eq!(book.borrowed_by.as_deref(), Some("user1"));
    }

    #[tokio::test]
    async fn insert_assigns_next_id() {
        let store = store();
        let new = sample_books().remove(0);
        let book = store.insert(new, Utc::now()).await.unwrap();
        assert_eq!(book.id, 4);
        assert_eq!(store.read(4).await.unwrap(), book);
    }

    #[tokio::test]
    async fn touch_updates_book_and_collection() {
        let store = store();
        let later = Utc::now() + Duration::minutes(5);

        store.touch(1, later).await.unwrap();
        assert_eq!(store.read(1).await.unwrap().updated_at, later);
        assert_eq!(store.last_modified().await.unwrap(), later);

        // 已删除的资源只推进集合时间
        store.delete(2).await.unwrap();
        let even_later = later + Duration::minutes(1);
        store.touch(2, even_later).await.unwrap();
        assert_eq!(store.last_modified().await.unwrap(), even_later);
    }
}
