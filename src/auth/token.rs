use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户名
    pub iat: i64,    // 签发时间
    pub exp: i64,    // 过期时间
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
}

/// 已签名的令牌，签发后不可变
#[derive(Debug, Clone)]
pub struct Token {
    claims: Claims,
    encoded: String,
}

impl Token {
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.claims.iat, 0).unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.claims.exp, 0).unwrap_or_default()
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// header.claims.signature 三段 base64url
    pub fn serialize(&self) -> &str {
        &self.encoded
    }

    pub fn into_string(self) -> String {
        self.encoded
    }
}

/// 无状态身份认证：签发和校验 HS256 令牌，不查询任何会话存储
pub struct TokenAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenAuthenticator {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            clock,
        }
    }

    /// 签发令牌，`ttl` 可以为负数（立即过期）
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<Token, jsonwebtoken::errors::Error> {
        let now = self.clock.now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now.saturating_add(ttl.num_seconds()),
        };

        let encoded = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        tracing::debug!("Issued token for {} expiring at {}", subject, claims.exp);

        Ok(Token { claims, encoded })
    }

    /// 校验令牌，成功时返回 subject
    ///
    /// 顺序：先解析（`Malformed`），再验签（`InvalidSignature`），最后检查过期（`Expired`）。
    /// 过期比较严格使用 `now > exp`，没有宽限时间。
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.parse_claims(token)?;
        self.check_signature(token)?;

        if self.clock.now().timestamp() > claims.exp {
            return Err(AuthError::Expired);
        }

        Ok(claims.sub)
    }

    fn parse_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::Malformed)
    }

    fn check_signature(&self, token: &str) -> Result<(), AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        // HMAC 比较在 jsonwebtoken 内部是常量时间的
        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(_) => Ok(()),
            Err(e) => match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::Base64(_) => {
                    Err(AuthError::InvalidSignature)
                }
                _ => Err(AuthError::Malformed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    const SECRET: &[u8] = b"test-secret";

    fn authenticator() -> (TokenAuthenticator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        (TokenAuthenticator::new(SECRET, clock.clone()), clock)
    }

    fn signature_segment(token: &str) -> (&str, &str) {
        let idx = token.rfind('.').unwrap();
        (&token[..=idx], &token[idx + 1..])
    }

    #[test]
    fn issued_token_verifies_to_its_subject() {
        let (auth, _) = authenticator();
        let token = auth.issue("alice", Duration::hours(1)).unwrap();

        assert_eq!(token.serialize().split('.').count(), 3);
        assert_eq!(token.expires_at() - token.issued_at(), Duration::hours(1));
        assert_eq!(auth.verify(token.serialize()), Ok("alice".to_string()));
    }

    #[test]
    fn every_signature_byte_is_checked() {
        let (auth, _) = authenticator();
        let token = auth.issue("alice", Duration::hours(1)).unwrap();
        let (prefix, signature) = signature_segment(token.serialize());

        for i in 0..signature.len() {
            let mut bytes = signature.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = format!("{}{}", prefix, String::from_utf8(bytes).unwrap());
            assert_eq!(
                auth.verify(&tampered),
                Err(AuthError::InvalidSignature),
                "byte {} of the signature was not checked",
                i
            );
        }
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let (auth, clock) = authenticator();
        let other = TokenAuthenticator::new(b"another-secret", clock);
        let token = other.issue("alice", Duration::hours(1)).unwrap();

        assert_eq!(auth.verify(token.serialize()), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn negative_ttl_is_expired_immediately() {
        let (auth, _) = authenticator();
        let token = auth.issue("alice", Duration::seconds(-1)).unwrap();

        assert_eq!(auth.verify(token.serialize()), Err(AuthError::Expired));
    }

    #[test]
    fn expiry_is_strictly_after_exp() {
        let (auth, clock) = authenticator();
        let token = auth.issue("alice", Duration::seconds(10)).unwrap();

        clock.advance(Duration::seconds(10));
        assert!(auth.verify(token.serialize()).is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(auth.verify(token.serialize()), Err(AuthError::Expired));
    }

    #[test]
    fn expired_after_clock_moves_two_hours() {
        let (auth, clock) = authenticator();
        let token = auth.issue("alice", Duration::hours(1)).unwrap();
        assert!(auth.verify(token.serialize()).is_ok());

        clock.advance(Duration::hours(2));
        assert_eq!(auth.verify(token.serialize()), Err(AuthError::Expired));
    }

    #[test]
    fn tampered_and_expired_reports_signature_first() {
        let (auth, _) = authenticator();
        let token = auth.issue("alice", Duration::seconds(-60)).unwrap();
        let (prefix, _) = signature_segment(token.serialize());
        let tampered = format!("{}AAAAAAAA", prefix);

        assert_eq!(auth.verify(&tampered), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let (auth, _) = authenticator();
        for input in ["", "not-a-token", "a.b", "abc.def.ghi", "...."] {
            assert_eq!(auth.verify(input), Err(AuthError::Malformed), "input {:?}", input);
        }
    }

    #[test]
    fn claims_without_subject_are_malformed() {
        #[derive(Serialize)]
        struct NoSubject {
            exp: i64,
        }
        let (auth, _) = authenticator();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &NoSubject { exp: 1_800_000_000 },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(auth.verify(&token), Err(AuthError::Malformed));
    }

    proptest! {
        #[test]
        fn round_trip_for_any_subject(subject in "\\PC{1,40}", ttl in 1i64..86_400) {
            let (auth, _) = authenticator();
            let token = auth.issue(&subject, Duration::seconds(ttl)).unwrap();
            prop_assert_eq!(auth.verify(token.serialize()), Ok(subject));
        }
    }
}
