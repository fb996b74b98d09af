//! 消息实体
//!
//! 每条消息归属一个房间，写入后不可修改；序号由持久层按房间分配。

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageId, Timestamp, UserId};

/// 消息类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Message,
    Picture,
    Answer,
    /// 服务端自动生成的房间事件（创建、加人）。
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Message => "message",
            MessageKind::Picture => "picture",
            MessageKind::Answer => "answer",
            MessageKind::System => "system",
        }
    }

    /// 解析客户端提交的消息类型；`system` 只能由服务端生成，不在这里接受。
    pub fn parse_client(value: &str) -> Option<Self> {
        match value {
            "message" => Some(MessageKind::Message),
            "picture" => Some(MessageKind::Picture),
            "answer" => Some(MessageKind::Answer),
            _ => None,
        }
    }

    pub fn parse_stored(value: &str) -> Option<Self> {
        match value {
            "system" => Some(MessageKind::System),
            other => Self::parse_client(other),
        }
    }
}

/// 已持久化的消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub author: UserId,
    pub kind: MessageKind,
    pub answer_to: Option<MessageId>,
    pub content: String,
    pub sent_on: Timestamp,
}

/// 待写入的消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub author: UserId,
    pub kind: MessageKind,
    pub answer_to: Option<MessageId>,
    pub content: String,
}

impl MessageDraft {
    /// 普通聊天消息。`answer` 类型必须引用一条非负序号的消息。
    pub fn new(
        author: UserId,
        kind: MessageKind,
        answer_to: Option<MessageId>,
        content: String,
    ) -> Result<Self, DomainError> {
        if kind == MessageKind::Answer {
            match answer_to {
                Some(id) if id.0 >= 0 => {}
                _ => {
                    return Err(DomainError::invalid_argument(
                        "answerToMessageID",
                        "answer requires a referenced message id",
                    ))
                }
            }
        }
        Ok(Self {
            author,
            kind,
            answer_to,
            content,
        })
    }

    /// 服务端生成的系统消息。
    pub fn system(author: UserId, content: impl Into<String>) -> Self {
        Self {
            author,
            kind: MessageKind::System,
            answer_to: None,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::parse("alice").unwrap()
    }

    #[test]
    fn answer_requires_reference() {
        let err = MessageDraft::new(user(), MessageKind::Answer, None, "hi".into());
        assert!(err.is_err());

        let err = MessageDraft::new(
            user(),
            MessageKind::Answer,
            Some(MessageId(-1)),
            "hi".into(),
        );
        assert!(err.is_err());

        let ok = MessageDraft::new(user(), MessageKind::Answer, Some(MessageId(3)), "hi".into());
        assert!(ok.is_ok());
    }

    #[test]
    fn client_kinds_exclude_system() {
        assert_eq!(MessageKind::parse_client("message"), Some(MessageKind::Message));
        assert_eq!(MessageKind::parse_client("picture"), Some(MessageKind::Picture));
        assert_eq!(MessageKind::parse_client("answer"), Some(MessageKind::Answer));
        assert_eq!(MessageKind::parse_client("system"), None);
        assert_eq!(MessageKind::parse_stored("system"), Some(MessageKind::System));
    }
}
