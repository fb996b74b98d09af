//! 房间与成员关系

use serde::{Deserialize, Serialize};

use crate::value_objects::{MessageId, RoomId, UserId};

/// 房间类型。
///
/// 私聊房间没有展示名称，成员固定为两人；
/// 公开房间携带展示名称，成员可以继续邀请。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Private,
    Public,
}

/// 聊天房间。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    /// `None` 表示私聊房间。
    pub display_name: Option<String>,
}

impl Room {
    pub fn kind(&self) -> RoomKind {
        if self.display_name.is_some() {
            RoomKind::Public
        } else {
            RoomKind::Private
        }
    }
}

/// 房间成员关系，记录成员的已读进度。
///
/// 成员被拉入房间时创建，之后只有 readRoom 会修改 `last_read`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub last_read: MessageId,
}
