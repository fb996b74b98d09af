//! 凭证校验接口

use domain::UserId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// 把客户端出示的不透明凭证解析成身份。
///
/// 每一帧都会重新校验，凭证的签发与过期策略由实现方决定。
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, TokenError>;
}
