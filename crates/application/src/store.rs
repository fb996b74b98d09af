//! 持久化网关抽象
//!
//! 每个需要数据的请求从网关取一个句柄，句柄绑定一条底层连接，
//! 随作用域结束自动归还；任何出口路径都不会泄漏。错误区分
//! "连接级失败"与"语句级失败"，前者意味着底层连接已不可用。

use async_trait::async_trait;
use domain::{Membership, Message, MessageDraft, MessageId, Room, RoomId, UserId};
use thiserror::Error;

/// 存储层错误。
#[derive(Debug, Error)]
pub enum StoreError {
    /// 底层连接已失效（获取失败、断开等）。
    #[error("storage connection error: {0}")]
    Connection(String),
    /// 语句执行失败，连接本身仍可用。
    #[error("storage query error: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

/// 房间成员条目。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub user_id: UserId,
    pub last_read: MessageId,
}

/// 存储网关：按请求派发数据句柄。
#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn StoreHandle>, StoreError>;
}

/// 一次请求范围内的数据访问句柄。
///
/// 多条语句的操作（建房、写消息、批量入房）在句柄内部保证原子性；
/// 跨方法调用之间没有事务语义，以提交先后为准。
#[async_trait]
pub trait StoreHandle: Send {
    /// 新建账号；用户名已存在时返回 `false`。
    async fn insert_user(&mut self, user: &UserId, password_hash: &str)
        -> Result<bool, StoreError>;

    async fn password_hash(&mut self, user: &UserId) -> Result<Option<String>, StoreError>;

    /// 过滤出确实存在的用户，顺序不作保证。
    async fn existing_users(&mut self, candidates: &[UserId]) -> Result<Vec<UserId>, StoreError>;

    /// 建房；`display_name` 为 `None` 表示私聊房间。
    async fn create_room(&mut self, display_name: Option<&str>) -> Result<RoomId, StoreError>;

    async fn room(&mut self, room: RoomId) -> Result<Option<Room>, StoreError>;

    /// 该用户加入的全部房间及其已读进度。
    async fn memberships_of_user(&mut self, user: &UserId)
        -> Result<Vec<Membership>, StoreError>;

    async fn members_of_room(&mut self, room: RoomId) -> Result<Vec<MemberEntry>, StoreError>;

    async fn is_member(&mut self, room: RoomId, user: &UserId) -> Result<bool, StoreError>;

    /// 把一批用户拉入房间，已读指针统一初始化为 `last_read`。
    async fn enroll_members(
        &mut self,
        room: RoomId,
        users: &[UserId],
        last_read: MessageId,
    ) -> Result<(), StoreError>;

    /// 候选者中存在、且尚未入房的用户。
    async fn addable_users(
        &mut self,
        room: RoomId,
        candidates: &[UserId],
    ) -> Result<Vec<UserId>, StoreError>;

    /// 追加一条消息，序号由存储层按房间单调分配。
    async fn append_message(
        &mut self,
        room: RoomId,
        draft: MessageDraft,
    ) -> Result<Message, StoreError>;

    async fn latest_message(&mut self, room: RoomId) -> Result<Option<Message>, StoreError>;

    /// 按序号倒序返回消息；`before` 为排他上界，`limit` 限制条数。
    async fn messages_before(
        &mut self,
        room: RoomId,
        before: Option<MessageId>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, StoreError>;

    /// 更新已读指针，返回受影响的行数。
    async fn mark_read(
        &mut self,
        room: RoomId,
        user: &UserId,
        up_to: MessageId,
    ) -> Result<u64, StoreError>;
}
