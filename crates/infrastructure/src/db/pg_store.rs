//! 持久化网关的 PostgreSQL 实现
//!
//! 每次 `acquire` 从池里取一条连接，包成句柄交给处理器；句柄随
//! 作用域结束归还连接。消息序号从 `rooms.last_seq` 计数列分配，
//! 与消息写入在同一事务里完成，保证每个房间内单调且无空洞。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPool;
use sqlx::{Connection, FromRow, Postgres, Row};

use application::{MemberEntry, StoreError, StoreGateway, StoreHandle};
use domain::{Membership, Message, MessageDraft, MessageId, MessageKind, Room, RoomId, UserId};

/// Postgres 存储网关。
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreGateway for PgStore {
    async fn acquire(&self) -> Result<Box<dyn StoreHandle>, StoreError> {
        let conn = self.pool.acquire().await.map_err(classify)?;
        Ok(Box::new(PgHandle { conn }))
    }
}

struct PgHandle {
    conn: PoolConnection<Postgres>,
}

/// 连接级失败与语句级失败分开归类。
fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(err.to_string()),
        _ => StoreError::Query(err.to_string()),
    }
}

/// 数据库消息行。
#[derive(Debug, FromRow)]
struct DbMessage {
    message_id: i64,
    author: String,
    kind: String,
    answer_to: Option<i64>,
    content: String,
    sent_on: DateTime<Utc>,
}

impl DbMessage {
    fn into_message(self) -> Result<Message, StoreError> {
        let author = UserId::parse(self.author.as_str())
            .map_err(|err| StoreError::Query(format!("corrupt author column: {}", err)))?;
        let kind = MessageKind::parse_stored(&self.kind)
            .ok_or_else(|| StoreError::Query(format!("corrupt kind column: {}", self.kind)))?;
        Ok(Message {
            id: MessageId(self.message_id),
            author,
            kind,
            answer_to: self.answer_to.map(MessageId),
            content: self.content,
            sent_on: self.sent_on,
        })
    }
}

const MESSAGE_COLUMNS: &str = "message_id, author, kind, answer_to, content, sent_on";

#[async_trait]
impl StoreHandle for PgHandle {
    async fn insert_user(
        &mut self,
        user: &UserId,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (user_id, password_hash) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user.as_str())
        .bind(password_hash)
        .execute(&mut *self.conn)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected() == 1)
    }

    async fn password_hash(&mut self, user: &UserId) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar("SELECT password_hash FROM users WHERE user_id = $1")
            .bind(user.as_str())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(classify)
    }

    async fn existing_users(&mut self, candidates: &[UserId]) -> Result<Vec<UserId>, StoreError> {
        let names: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = ANY($1)")
                .bind(&names)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(classify)?;
        rows.into_iter()
            .map(|name| {
                UserId::parse(name.as_str())
                    .map_err(|err| StoreError::Query(format!("corrupt user_id column: {}", err)))
            })
            .collect()
    }

    async fn create_room(&mut self, display_name: Option<&str>) -> Result<RoomId, StoreError> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO rooms (display_name) VALUES ($1) RETURNING room_id")
                .bind(display_name)
                .fetch_one(&mut *self.conn)
                .await
                .map_err(classify)?;
        Ok(RoomId(id))
    }

    async fn room(&mut self, room: RoomId) -> Result<Option<Room>, StoreError> {
        let row = sqlx::query("SELECT display_name FROM rooms WHERE room_id = $1")
            .bind(room.0)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(classify)?;
        Ok(row.map(|row| Room {
            id: room,
            display_name: row.get("display_name"),
        }))
    }

    async fn memberships_of_user(
        &mut self,
        user: &UserId,
    ) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query(
            "SELECT room_id, last_read FROM room_members WHERE user_id = $1 ORDER BY room_id",
        )
        .bind(user.as_str())
        .fetch_all(&mut *self.conn)
        .await
        .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|row| Membership {
                room_id: RoomId(row.get("room_id")),
                user_id: user.clone(),
                last_read: MessageId(row.get("last_read")),
            })
            .collect())
    }

    async fn members_of_room(&mut self, room: RoomId) -> Result<Vec<MemberEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id, last_read FROM room_members WHERE room_id = $1 ORDER BY user_id",
        )
        .bind(room.0)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(classify)?;
        rows.into_iter()
            .map(|row| {
                let user_id = UserId::parse(row.get::<String, _>("user_id").as_str())
                    .map_err(|err| StoreError::Query(format!("corrupt user_id column: {}", err)))?;
                Ok(MemberEntry {
                    user_id,
                    last_read: MessageId(row.get("last_read")),
                })
            })
            .collect()
    }

    async fn is_member(&mut self, room: RoomId, user: &UserId) -> Result<bool, StoreError> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM room_members WHERE room_id = $1 AND user_id = $2)",
        )
        .bind(room.0)
        .bind(user.as_str())
        .fetch_one(&mut *self.conn)
        .await
        .map_err(classify)
    }

    async fn enroll_members(
        &mut self,
        room: RoomId,
        users: &[UserId],
        last_read: MessageId,
    ) -> Result<(), StoreError> {
        let mut tx = self.conn.begin().await.map_err(classify)?;
        for user in users {
            sqlx::query(
                "INSERT INTO room_members (room_id, user_id, last_read) VALUES ($1, $2, $3) \
                 ON CONFLICT (room_id, user_id) DO NOTHING",
            )
            .bind(room.0)
            .bind(user.as_str())
            .bind(last_read.0)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }
        tx.commit().await.map_err(classify)
    }

    async fn addable_users(
        &mut self,
        room: RoomId,
        candidates: &[UserId],
    ) -> Result<Vec<UserId>, StoreError> {
        let names: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM users WHERE user_id = ANY($2) \
             AND user_id NOT IN (SELECT user_id FROM room_members WHERE room_id = $1)",
        )
        .bind(room.0)
        .bind(&names)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(classify)?;
        rows.into_iter()
            .map(|name| {
                UserId::parse(name.as_str())
                    .map_err(|err| StoreError::Query(format!("corrupt user_id column: {}", err)))
            })
            .collect()
    }

    async fn append_message(
        &mut self,
        room: RoomId,
        draft: MessageDraft,
    ) -> Result<Message, StoreError> {
        let mut tx = self.conn.begin().await.map_err(classify)?;

        let next_seq: Option<i64> = sqlx::query_scalar(
            "UPDATE rooms SET last_seq = last_seq + 1 WHERE room_id = $1 RETURNING last_seq",
        )
        .bind(room.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?;
        let Some(next_seq) = next_seq else {
            return Err(StoreError::Query(format!("room {} does not exist", room)));
        };

        let sent_on: DateTime<Utc> = sqlx::query_scalar(
            "INSERT INTO messages (room_id, message_id, author, kind, answer_to, content) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING sent_on",
        )
        .bind(room.0)
        .bind(next_seq)
        .bind(draft.author.as_str())
        .bind(draft.kind.as_str())
        .bind(draft.answer_to.map(i64::from))
        .bind(&draft.content)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        Ok(Message {
            id: MessageId(next_seq),
            author: draft.author,
            kind: draft.kind,
            answer_to: draft.answer_to,
            content: draft.content,
            sent_on,
        })
    }

    async fn latest_message(&mut self, room: RoomId) -> Result<Option<Message>, StoreError> {
        let row: Option<DbMessage> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE room_id = $1 ORDER BY message_id DESC LIMIT 1",
            MESSAGE_COLUMNS
        ))
        .bind(room.0)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(classify)?;
        row.map(DbMessage::into_message).transpose()
    }

    async fn messages_before(
        &mut self,
        room: RoomId,
        before: Option<MessageId>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<DbMessage> = match (before, limit) {
            (Some(before), Some(limit)) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM messages WHERE room_id = $1 AND message_id < $2 \
                     ORDER BY message_id DESC LIMIT $3",
                    MESSAGE_COLUMNS
                ))
                .bind(room.0)
                .bind(before.0)
                .bind(limit)
                .fetch_all(&mut *self.conn)
                .await
            }
            (Some(before), None) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM messages WHERE room_id = $1 AND message_id < $2 \
                     ORDER BY message_id DESC",
                    MESSAGE_COLUMNS
                ))
                .bind(room.0)
                .bind(before.0)
                .fetch_all(&mut *self.conn)
                .await
            }
            (None, Some(limit)) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM messages WHERE room_id = $1 \
                     ORDER BY message_id DESC LIMIT $2",
                    MESSAGE_COLUMNS
                ))
                .bind(room.0)
                .bind(limit)
                .fetch_all(&mut *self.conn)
                .await
            }
            (None, None) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM messages WHERE room_id = $1 ORDER BY message_id DESC",
                    MESSAGE_COLUMNS
                ))
                .bind(room.0)
                .fetch_all(&mut *self.conn)
                .await
            }
        }
        .map_err(classify)?;

        rows.into_iter().map(DbMessage::into_message).collect()
    }

    async fn mark_read(
        &mut self,
        room: RoomId,
        user: &UserId,
        up_to: MessageId,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE room_members SET last_read = $3 WHERE room_id = $1 AND user_id = $2",
        )
        .bind(room.0)
        .bind(user.as_str())
        .bind(up_to.0)
        .execute(&mut *self.conn)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected())
    }
}
