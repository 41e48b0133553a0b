use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use library_api::{
    AppState,
    clock::{Clock, SystemClock},
    config::Config,
    middleware::{CircuitBreaker, RateLimiter},
    routes,
    store::{MemoryStore, PgStore},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration (JWT_SECRET is required)");
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 配置了 DATABASE_URL 时使用 Postgres，否则使用内存存储
    let state = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .after_connect(|conn, _meta| {
                    Box::pin(async move {
                        conn.execute("SET application_name = 'library_api';").await?;
                        Ok(())
                    })
                })
                .connect(database_url)
                .await
                .expect("Failed to connect to Postgres");

            let store = Arc::new(PgStore::new(pool));
            store.ensure_schema().await.expect("Failed to create tables");
            store
                .seed(config.bcrypt_cost, clock.now())
                .await
                .expect("Failed to seed sample data");
            tracing::info!("Using Postgres store");

            AppState::new(config.clone(), store.clone(), store, clock)
        }
        None => {
            let store = Arc::new(
                MemoryStore::seeded(config.bcrypt_cost, clock.now())
                    .expect("Failed to seed in-memory store"),
            );
            tracing::info!("DATABASE_URL not set, using in-memory store");

            AppState::new(config.clone(), store.clone(), store, clock)
        }
    };

    // 设置限流器和熔断器
    let rate_limiter =
        Arc::new(RateLimiter::from_config(&config).expect("Failed to create Redis client"));
    let breaker = Arc::new(CircuitBreaker::from_config(&config));

    let router = routes::create_router(state.clone(), rate_limiter, breaker);

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
