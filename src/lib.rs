use std::sync::{Arc, OnceLock};

use auth::TokenAuthenticator;
use cache::CacheValidator;
use clock::Clock;
use config::Config;
use events::BookEvents;
use store::{BookStore, MemoryStore, StoreError, UserStore};

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod middleware;
pub mod models;
pub mod store;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub books: Arc<dyn BookStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<TokenAuthenticator>,
    pub cache: Arc<CacheValidator>,
    pub clock: Arc<dyn Clock>,
    pub events: BookEvents,
    dummy_hash: Arc<OnceLock<String>>,
}

impl AppState {
    pub fn new(
        config: Config,
        books: Arc<dyn BookStore>,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens: Arc::new(TokenAuthenticator::new(
                config.jwt_secret.as_bytes(),
                clock.clone(),
            )),
            cache: Arc::new(CacheValidator::new(clock.clone())),
            config,
            books,
            users,
            clock,
            events: BookEvents::new(),
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// 使用带示例数据的内存存储
    pub fn in_memory(config: Config, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let store = Arc::new(MemoryStore::seeded(config.bcrypt_cost, clock.now())?);
        Ok(Self::new(config, store.clone(), store, clock))
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.config.jwt_expiration_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }

    /// 和真实账号同样代价的哈希，用户不存在时也校验一次
    pub fn dummy_password_hash(&self) -> &str {
        self.dummy_hash.get_or_init(|| {
            utils::hash_password("not-a-real-password", self.config.bcrypt_cost)
                .unwrap_or_default()
        })
    }
}
