//! 聊天服务核心领域模型
//!
//! 包含用户标识、房间、成员关系和消息等核心类型及其校验规则。

pub mod errors;
pub mod message;
pub mod room;
pub mod value_objects;

pub use errors::DomainError;
pub use message::{Message, MessageDraft, MessageKind};
pub use room::{Membership, Room, RoomKind};
pub use value_objects::{MessageId, RoomId, Timestamp, UserId};
