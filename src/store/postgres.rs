use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{BookQuery, BookStore, SAMPLE_USERS, StoreError, UserStore};
use crate::models::{Book, BookPatch, NewBook, User, sample_books};
use crate::utils::hash_password;

const BOOK_COLUMNS: &str =
    "id, title, author, isbn, publish_year, category, borrowed_by, updated_at";

/// Postgres 存储，一致性由数据库保证
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 建表（如不存在）
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id BIGSERIAL PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                isbn TEXT NOT NULL,
                publish_year INT,
                category TEXT,
                borrowed_by TEXT,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS library_users (
                username TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalogue_meta (
                id SMALLINT PRIMARY KEY,
                last_modified TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO catalogue_meta (id, last_modified) VALUES (1, NOW()) ON CONFLICT (id) DO NOTHING",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 空库时写入示例图书和示例账号
    pub async fn seed(&self, bcrypt_cost: u32, now: DateTime<Utc>) -> Result<(), StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        if count == 0 {
            for book in sample_books() {
                self.insert(book, now).await?;
            }
            tracing::info!("Seeded sample books");
        }

        for (username, password, role) in SAMPLE_USERS {
            let password_hash = hash_password(password, bcrypt_cost)?;
            sqlx::query(
                r#"
                INSERT INTO library_users (username, password_hash, role)
                VALUES ($1, $2, $3)
                ON CONFLICT (username) DO NOTHING
                "#,
            )
            .bind(username)
            .bind(password_hash)
            .bind(role)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

fn like_pattern(q: &str) -> String {
    format!("%{}%", q.replace('%', "\\%").replace('_', "\\_"))
}

#[async_trait]
impl BookStore for PgStore {
    async fn search(&self, query: &BookQuery) -> Result<(Vec<Book>, u64), StoreError> {
        let pattern = query.q.as_deref().map(like_pattern);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM books WHERE $1::TEXT IS NULL OR title ILIKE $1 OR author ILIKE $1",
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let books = sqlx::query_as::<_, Book>(&format!(
            r#"
            SELECT {BOOK_COLUMNS} FROM books
            WHERE $1::TEXT IS NULL OR title ILIKE $1 OR author ILIKE $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(&pattern)
        .bind(i64::from(query.per_page))
        .bind(query.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok((books, total.max(0) as u64))
    }

    async fn all(&self) -> Result<Vec<Book>, StoreError> {
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn read(&self, id: i64) -> Result<Book, StoreError> {
        sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::book_not_found(id))
    }

    async fn insert(&self, book: NewBook, at: DateTime<Utc>) -> Result<Book, StoreError> {
        let book = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, isbn, publish_year, category, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {BOOK_COLUMNS}
            "#
        ))
        .bind(book.title)
        .bind(book.author)
        .bind(book.isbn)
        .bind(book.publish_year)
        .bind(book.category)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        Ok(book)
    }

    async fn update(&self, id: i64, patch: &BookPatch) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = COALESCE($2, title),
                author = COALESCE($3, author),
                isbn = COALESCE($4, isbn),
                publish_year = COALESCE($5, publish_year),
                category = COALESCE($6, category)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.author)
        .bind(&patch.isbn)
        .bind(patch.publish_year)
        .bind(&patch.category)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::book_not_found(id));
        }
        Ok(())
    }

    async fn set_borrower(
        &self,
        id: i64,
        expected: Option<&str>,
        borrower: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE books SET borrowed_by = $3 WHERE id = $1 AND borrowed_by IS NOT DISTINCT FROM $2",
        )
        .bind(id)
        .bind(expected)
        .bind(borrower)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // 区分不存在和借阅人不符
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM books WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(StoreError::book_not_found(id));
        }
        Ok(false)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::book_not_found(id));
        }
        Ok(())
    }

    async fn touch(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE books SET updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO catalogue_meta (id, last_modified) VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE SET last_modified = EXCLUDED.last_modified
            "#,
        )
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn last_modified(&self) -> Result<DateTime<Utc>, StoreError> {
        let at: DateTime<Utc> =
            sqlx::query_scalar("SELECT last_modified FROM catalogue_meta WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(at)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT username, password_hash, role FROM library_users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rest"), "%rest%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
