use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{
    clock::{Clock, whole_seconds},
    store::{BookStore, StoreError},
};

use super::headers::etag_matches;

/// 可以被 HTTP 缓存的资源
pub trait Cacheable: Serialize {
    fn last_modified(&self) -> DateTime<Utc>;
}

/// 资源快照的缓存元数据，每次读取时重新计算
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDescriptor {
    /// 规范化 JSON 的 SHA-256，十六进制小写
    pub fingerprint: String,
    pub last_modified: DateTime<Utc>,
    pub max_age: u64,
}

pub struct CacheValidator {
    clock: Arc<dyn Clock>,
}

impl CacheValidator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn describe<R: Cacheable>(
        &self,
        resource: &R,
        max_age: u64,
    ) -> Result<CacheDescriptor, serde_json::Error> {
        let canonical = serde_json::to_vec(&canonicalize(serde_json::to_value(resource)?))?;
        let fingerprint = format!("{:x}", Sha256::digest(&canonical));

        Ok(CacheDescriptor {
            fingerprint,
            last_modified: whole_seconds(resource.last_modified()),
            max_age,
        })
    }

    /// 客户端缓存是否仍然有效
    ///
    /// ETag 完全相等，或者 `If-Modified-Since` 不早于 `last_modified`（按整秒比较），任一成立即为新鲜。
    pub fn is_fresh(
        client_etag: Option<&str>,
        client_if_modified_since: Option<DateTime<Utc>>,
        descriptor: &CacheDescriptor,
    ) -> bool {
        if client_etag.is_some_and(|tags| etag_matches(tags, &descriptor.fingerprint)) {
            return true;
        }

        client_if_modified_since
            .is_some_and(|since| since.timestamp() >= descriptor.last_modified.timestamp())
    }

    /// 写路径在变更成功后调用，刷新资源和集合的 `last_modified`
    pub async fn on_mutate(
        &self,
        store: &dyn BookStore,
        id: i64,
    ) -> Result<DateTime<Utc>, StoreError> {
        let now = whole_seconds(self.clock.now());
        store.touch(id, now).await?;
        tracing::debug!("Resource {} modified at {}", id, now);
        Ok(now)
    }
}

// 对象键按字典序排列，保证同样的内容得到同样的字节
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
