use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    error::AppError,
    events::BookEvent,
    middleware::{Admin, Cached, Principal, no_cache},
    models::{Book, Statistics},
    routes::version::{ApiVersion, mark_deprecated},
};

use super::model::{
    BookListV1, BookListV2, BookSearchParams, CreateBookRequest, UpdateBookRequest,
};

/// 写入成功后刷新缓存时间，读回最新状态并通知看板
async fn commit(state: &AppState, id: i64) -> Result<Book, AppError> {
    state.cache.on_mutate(state.books.as_ref(), id).await?;
    Ok(state.books.read(id).await?)
}

fn announce(state: &AppState, event: BookEvent) {
    let delivered = state.events.publish(event);
    tracing::debug!("Book event delivered to {} board clients", delivered);
}

#[axum::debug_handler]
pub async fn list_books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BookSearchParams>,
) -> Result<Response, AppError> {
    let version = ApiVersion::negotiate(params.version.as_deref(), &headers);
    list_books_as(&state, &params, version).await
}

#[axum::debug_handler]
pub async fn list_books_v1(
    State(state): State<AppState>,
    Query(params): Query<BookSearchParams>,
) -> Result<Response, AppError> {
    list_books_as(&state, &params, ApiVersion::V1).await
}

#[axum::debug_handler]
pub async fn list_books_v2(
    State(state): State<AppState>,
    Query(params): Query<BookSearchParams>,
) -> Result<Response, AppError> {
    list_books_as(&state, &params, ApiVersion::V2).await
}

async fn list_books_as(
    state: &AppState,
    params: &BookSearchParams,
    version: ApiVersion,
) -> Result<Response, AppError> {
    let query = params.to_query();
    let (books, total) = state.books.search(&query).await?;
    let last_modified = state.books.last_modified().await?;

    let list = BookListV1 {
        books,
        total,
        pages: total.div_ceil(u64::from(query.per_page)),
        current_page: query.page,
        last_modified,
    };
    let max_age = state.config.book_max_age_secs;

    let mut response = match version {
        ApiVersion::V1 => {
            let descriptor = state.cache.describe(&list, max_age)?;
            Cached::new(list, descriptor).into_response()
        }
        ApiVersion::V2 => {
            let list = BookListV2::from(list);
            let descriptor = state.cache.describe(&list, max_age)?;
            Cached::new(list, descriptor).into_response()
        }
    };
    let headers = response.headers_mut();
    // 表示形式随 Accept 变化
    headers.insert(header::VARY, HeaderValue::from_static("accept"));
    if version == ApiVersion::V1 {
        mark_deprecated(headers, &state.config.api_base_uri);
    }
    Ok(response)
}

#[axum::debug_handler]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Cached<Book>, AppError> {
    let book = state.books.read(id).await?;
    let descriptor = state.cache.describe(&book, state.config.book_max_age_secs)?;
    Ok(Cached::new(book, descriptor))
}

/// 统计数据计算代价较高，缓存时间更长
#[axum::debug_handler]
pub async fn statistics(State(state): State<AppState>) -> Result<Cached<Statistics>, AppError> {
    let books = state.books.all().await?;
    let stats = Statistics::collect(&books, state.books.last_modified().await?);
    let descriptor = state.cache.describe(&stats, state.config.stats_max_age_secs)?;
    Ok(Cached::new(stats, descriptor))
}

#[axum::debug_handler]
pub async fn create_book(
    principal: Principal,
    State(state): State<AppState>,
    Json(req): Json<CreateBookRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_book = req.validate()?;
    let book = state.books.insert(new_book, state.clock.now()).await?;
    let book = commit(&state, book.id).await?;
    tracing::info!("Book {} created by {}", book.id, principal.username);
    announce(&state, BookEvent::Added { book: book.clone() });

    Ok((StatusCode::CREATED, no_cache(), Json(book)))
}

#[axum::debug_handler]
pub async fn update_book(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateBookRequest>,
) -> Result<impl IntoResponse, AppError> {
    let patch = req.into_patch()?;
    state.books.update(id, &patch).await?;
    let book = commit(&state, id).await?;
    tracing::info!("Book {} updated by {}", id, principal.username);
    announce(&state, BookEvent::Updated { book: book.clone() });

    Ok((no_cache(), Json(book)))
}

/// 删除只允许管理员
#[axum::debug_handler]
pub async fn delete_book(
    Admin(principal): Admin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.books.delete(id).await?;
    state.cache.on_mutate(state.books.as_ref(), id).await?;
    tracing::info!("Book {} deleted by {}", id, principal.username);
    announce(&state, BookEvent::Deleted { id });

    Ok((StatusCode::NO_CONTENT, no_cache()))
}

/// 借书：借阅人取自令牌，不依赖会话
#[axum::debug_handler]
pub async fn borrow_book(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    // 只有当前无人借阅时才会写入
    if !state
        .books
        .set_borrower(id, None, Some(&principal.username))
        .await?
    {
        let book = state.books.read(id).await?;
        let borrower = book.borrowed_by.unwrap_or_default();
        return Err(AppError::Conflict(format!("图书已被 {} 借出", borrower)));
    }

    let book = commit(&state, id).await?;
    tracing::info!("Book {} borrowed by {}", id, principal.username);
    announce(&state, BookEvent::Updated { book: book.clone() });

    Ok((no_cache(), Json(book)))
}

#[axum::debug_handler]
pub async fn return_book(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !state
        .books
        .set_borrower(id, Some(&principal.username), None)
        .await?
    {
        let book = state.books.read(id).await?;
        return Err(match book.borrowed_by {
            None => AppError::Conflict("图书未被借出".to_string()),
            Some(_) => AppError::Forbidden("只能归还自己借的书".to_string()),
        });
    }

    let book = commit(&state, id).await?;
    tracing::info!("Book {} returned by {}", id, principal.username);
    announce(&state, BookEvent::Updated { book: book.clone() });

    Ok((no_cache(), Json(book)))
}
