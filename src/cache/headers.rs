use axum::http::{HeaderMap, HeaderValue, header};
use chrono::{DateTime, NaiveDateTime, Utc};

use super::CacheDescriptor;

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// `If-None-Match` 是否命中指纹
///
/// 支持逗号分隔的列表、弱校验前缀 `W/` 和 `*`，比较本身是逐字节的。
pub fn etag_matches(if_none_match: &str, fingerprint: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|tag| {
        if tag == "*" {
            return true;
        }
        let tag = tag.strip_prefix("W/").unwrap_or(tag);
        let tag = tag
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(tag);
        tag == fingerprint
    })
}

pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(IMF_FIXDATE).to_string()
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, IMF_FIXDATE)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc2822(value)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}

/// 200 响应带上 ETag、Last-Modified 和 Cache-Control
pub fn apply_cache_headers(headers: &mut HeaderMap, descriptor: &CacheDescriptor) {
    let etag = format!("\"{}\"", descriptor.fingerprint);
    let cache_control = format!("public, max-age={}", descriptor.max_age);
    let last_modified = format_http_date(descriptor.last_modified);

    for (name, value) in [
        (header::ETAG, etag),
        (header::CACHE_CONTROL, cache_control),
        (header::LAST_MODIFIED, last_modified),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

pub fn if_none_match(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
}

pub fn if_modified_since(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date)
}
