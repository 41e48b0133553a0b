use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub breaker_fail_max: u32,
    pub breaker_reset_secs: u64,
    pub book_max_age_secs: u64,
    pub stats_max_age_secs: u64,
    pub bcrypt_cost: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
}

// 令牌有效期上限：一年
const MAX_JWT_EXPIRATION_HOURS: u64 = 24 * 365;

/// `JWT_EXPIRATION` 以小时为单位，例如 "1h"；无法解析时为 1 小时，超过上限时截断
fn jwt_expiration_secs(value: Option<&str>) -> u64 {
    let hours = value
        .and_then(|v| v.trim().trim_end_matches('h').parse::<u64>().ok())
        .unwrap_or(1);
    if hours > MAX_JWT_EXPIRATION_HOURS {
        tracing::warn!(
            "JWT_EXPIRATION of {}h exceeds {}h, clamping",
            hours,
            MAX_JWT_EXPIRATION_HOURS
        );
    }
    hours.min(MAX_JWT_EXPIRATION_HOURS).saturating_mul(3600)
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置，`.env` 文件优先加载
    ///
    /// 只有 `JWT_SECRET` 是必填项，其余均有默认值。
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        Ok(Config {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration_secs(
                env::var("JWT_EXPIRATION").ok().as_deref(),
            ),
            rate_limit_window_secs: parse_or("RATE_LIMIT_WINDOW", defaults.rate_limit_window_secs),
            rate_limit_requests: parse_or("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests),
            breaker_fail_max: parse_or("BREAKER_FAIL_MAX", defaults.breaker_fail_max),
            breaker_reset_secs: parse_or("BREAKER_RESET_SECS", defaults.breaker_reset_secs),
            book_max_age_secs: parse_or("BOOK_MAX_AGE", defaults.book_max_age_secs),
            stats_max_age_secs: parse_or("STATS_MAX_AGE", defaults.stats_max_age_secs),
            bcrypt_cost: parse_or("BCRYPT_COST", defaults.bcrypt_cost),
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
            api_base_uri: env::var("API_BASE_URI").unwrap_or(defaults.api_base_uri),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker_reset_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            jwt_secret: "change-me".to_string(),
            jwt_expiration_secs: 3600,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            breaker_fail_max: 5,
            breaker_reset_secs: 60,
            book_max_age_secs: 300,
            stats_max_age_secs: 600,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            api_base_uri: "/api".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = Config::default();
        assert_eq!(config.jwt_expiration(), Duration::from_secs(3600));
        assert_eq!(config.rate_limit_requests, 100);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(config.breaker_fail_max, 5);
        assert_eq!(config.book_max_age_secs, 300);
        assert_eq!(config.stats_max_age_secs, 600);
        assert_eq!(config.api_base_uri, "/api");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn jwt_expiration_is_parsed_in_hours_and_clamped() {
        assert_eq!(jwt_expiration_secs(None), 3600);
        assert_eq!(jwt_expiration_secs(Some("2h")), 7200);
        assert_eq!(jwt_expiration_secs(Some(" 24 ")), 86_400);
        assert_eq!(jwt_expiration_secs(Some("soon")), 3600);
        assert_eq!(
            jwt_expiration_secs(Some("18446744073709551615h")),
            MAX_JWT_EXPIRATION_HOURS * 3600
        );
    }

    #[test]
    fn parse_or_falls_back_on_garbage() {
        // SAFETY: 测试进程内只有这一处修改该变量
        unsafe { env::set_var("LIBRARY_API_TEST_PORT", "not-a-number") };
        assert_eq!(parse_or("LIBRARY_API_TEST_PORT", 3000u16), 3000);
        unsafe { env::set_var("LIBRARY_API_TEST_PORT", " 8080 ") };
        assert_eq!(parse_or("LIBRARY_API_TEST_PORT", 3000u16), 8080);
    }
}
