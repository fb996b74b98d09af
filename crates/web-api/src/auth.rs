//! JWT 认证模块
//!
//! 提供 JWT token 生成、验证

use config::JwtConfig;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use application::{TokenError, TokenVerifier};
use domain::UserId;

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// 用户标识
    pub user: String,
    /// 过期时间 (Unix timestamp)
    pub exp: i64,
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 为通过口令验证的用户签发 token
    pub fn issue(&self, user: &UserId) -> Result<String, ApiError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            user: user.to_string(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            tracing::error!(error = %err, "token generation failed");
            ApiError::internal_server_error("Token generation failed")
        })
    }
}

impl TokenVerifier for JwtService {
    fn verify(&self, token: &str) -> Result<UserId, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default()).map_err(
            |err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(err.to_string()),
            },
        )?;
        UserId::parse(data.claims.user.as_str())
            .map_err(|err| TokenError::Invalid(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret-key-with-enough-length!!".to_string(),
            expiration_hours: 1,
        })
    }

    #[test]
    fn issued_tokens_verify_back_to_the_user() {
        let service = service();
        let alice = UserId::parse("alice").unwrap();
        let token = service.issue(&alice).unwrap();
        assert_eq!(service.verify(&token).unwrap(), alice);
    }

    #[test]
    fn garbage_tokens_are_invalid() {
        let service = service();
        assert!(matches!(
            service.verify("not-a-jwt"),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let service = service();
        let other = JwtService::new(JwtConfig {
            secret: "another-secret-key-with-enough-length".to_string(),
            expiration_hours: 1,
        });
        let token = other.issue(&UserId::parse("alice").unwrap()).unwrap();
        assert!(service.verify(&token).is_err());
    }
}
