use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, header},
};
use serde_json::{Value, json};

use crate::AppState;

/// v1 停止服务的日期（HTTP-date）
pub const V1_SUNSET: &str = "Sun, 01 Jun 2025 00:00:00 GMT";

const DEPRECATION: HeaderName = HeaderName::from_static("deprecation");
const SUNSET: HeaderName = HeaderName::from_static("sunset");

/// 接口版本：路径（/v1、/v2）、查询参数（?version=2）或 Accept 头
/// （application/vnd.api.v2+json）三种方式协商，默认 v1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub fn negotiate(query: Option<&str>, headers: &HeaderMap) -> Self {
        if let Some(version) = query {
            return Self::parse(version);
        }

        match headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
            Some(accept) if accept.contains("vnd.api.v2") => ApiVersion::V2,
            _ => ApiVersion::V1,
        }
    }

    fn parse(value: &str) -> Self {
        match value.trim().trim_start_matches(['v', 'V']) {
            "2" => ApiVersion::V2,
            _ => ApiVersion::V1,
        }
    }
}

/// 给已弃用的 v1 响应加上 `Deprecation`、`Sunset` 和指向 v2 的 `Link`
pub fn mark_deprecated(headers: &mut HeaderMap, base_uri: &str) {
    let successor = format!(
        "<{}/v2/books>; rel=\"successor-version\"",
        base_uri.trim_end_matches('/')
    );

    headers.insert(DEPRECATION, HeaderValue::from_static("true"));
    headers.insert(SUNSET, HeaderValue::from_static(V1_SUNSET));
    if let Ok(link) = HeaderValue::from_str(&successor) {
        headers.insert(header::LINK, link);
    }
}

/// 版本说明
pub async fn versions(State(state): State<AppState>) -> Json<Value> {
    let base = state.config.api_base_uri.trim_end_matches('/');

    Json(json!({
        "versions": {
            "v1": {
                "status": "deprecated",
                "sunset": V1_SUNSET,
                "endpoint": format!("{}/v1/books", base),
                "successor": "v2",
            },
            "v2": {
                "status": "current",
                "endpoint": format!("{}/v2/books", base),
                "breaking_changes": [
                    "Books moved inside the data wrapper",
                    "total renamed to count",
                    "status field added",
                ],
            },
        },
        "negotiation": {
            "query": "?version=2",
            "accept": "application/vnd.api.v2+json",
        },
    }))
}
