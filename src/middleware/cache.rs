use axum::{
    Json,
    body::Body,
    http::{Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::cache::{
    CacheDescriptor, CacheValidator,
    headers::{apply_cache_headers, if_modified_since, if_none_match},
};

/// 处理器返回的可缓存响应，描述信息放在响应扩展里交给 `cache_annotate`
pub struct Cached<T> {
    pub body: T,
    pub descriptor: CacheDescriptor,
}

impl<T> Cached<T> {
    pub fn new(body: T, descriptor: CacheDescriptor) -> Self {
        Self { body, descriptor }
    }
}

impl<T: Serialize> IntoResponse for Cached<T> {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        response.extensions_mut().insert(self.descriptor);
        response
    }
}

/// 管道最后一阶段：根据条件请求头决定返回 304 还是带缓存头的 200
pub async fn cache_annotate(req: Request<Body>, next: Next) -> Response {
    let conditional = matches!(*req.method(), Method::GET | Method::HEAD);
    let etag = if_none_match(req.headers()).map(str::to_owned);
    let since = if_modified_since(req.headers());

    let mut response = next.run(req).await;

    let Some(descriptor) = response.extensions_mut().remove::<CacheDescriptor>() else {
        return response;
    };
    if !response.status().is_success() {
        return response;
    }

    if conditional && CacheValidator::is_fresh(etag.as_deref(), since, &descriptor) {
        tracing::debug!("Not modified: {}", descriptor.fingerprint);
        return not_modified(response, &descriptor);
    }

    apply_cache_headers(response.headers_mut(), &descriptor);
    response
}

/// 保留处理器设置的头（Vary、弃用提示等），去掉 body
fn not_modified(response: Response, descriptor: &CacheDescriptor) -> Response {
    let (mut parts, _) = response.into_parts();
    parts.status = StatusCode::NOT_MODIFIED;
    parts.headers.remove(header::CONTENT_TYPE);
    parts.headers.remove(header::CONTENT_LENGTH);
    apply_cache_headers(&mut parts.headers, descriptor);
    Response::from_parts(parts, Body::empty())
}

/// 写操作的响应不允许缓存
pub fn no_cache() -> [(header::HeaderName, &'static str); 1] {
    [(header::CACHE_CONTROL, "no-cache")]
}
