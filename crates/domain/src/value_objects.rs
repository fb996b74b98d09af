use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

/// 用户唯一标识。
///
/// 用户自选的登录名，同时也是对外展示的身份；
/// 数据库列为 VARCHAR(30)，这里在构造时做同样的长度校验。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub const MAX_LEN: usize = 30;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_argument("user", "cannot be empty"));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("user", "too long"));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 房间唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RoomId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<RoomId> for i64 {
    fn from(value: RoomId) -> Self {
        value.0
    }
}

/// 消息序号。
///
/// 由持久层按房间单调分配；0 表示"尚未读过任何消息"。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    /// 新成员的初始已读指针。
    pub const ZERO: MessageId = MessageId(0);
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<MessageId> for i64 {
    fn from(value: MessageId) -> Self {
        value.0
    }
}
