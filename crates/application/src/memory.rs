//! 内存存储实现
//!
//! 与 Postgres 网关同构的纯内存版本，供单元测试和无数据库的
//! 端到端测试使用。所有状态挂在一把锁后面，锁内没有挂起点。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use domain::{Membership, Message, MessageDraft, MessageId, Room, RoomId, UserId};

use crate::store::{MemberEntry, StoreError, StoreGateway, StoreHandle};

#[derive(Default)]
struct MemoryState {
    /// user -> password hash
    users: BTreeMap<String, String>,
    rooms: BTreeMap<i64, MemoryRoom>,
    next_room: i64,
}

struct MemoryRoom {
    display_name: Option<String>,
    last_seq: i64,
    /// user -> last_read
    members: BTreeMap<String, i64>,
    messages: Vec<Message>,
}

/// 内存存储网关。克隆共享同一份状态。
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn acquire(&self) -> Result<Box<dyn StoreHandle>, StoreError> {
        Ok(Box::new(MemoryHandle {
            state: self.state.clone(),
        }))
    }
}

struct MemoryHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHandle {
    /// 写路径：房间不存在等价于违反外键约束。
    fn with_room<T>(
        &self,
        room: RoomId,
        f: impl FnOnce(&mut MemoryRoom) -> T,
    ) -> Result<T, StoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        match state.rooms.get_mut(&room.0) {
            Some(entry) => Ok(f(entry)),
            None => Err(StoreError::Query(format!("room {} does not exist", room))),
        }
    }

    /// 读路径：房间不存在时返回空结果，与 SQL SELECT 语义一致。
    fn read_room<T: Default>(&self, room: RoomId, f: impl FnOnce(&MemoryRoom) -> T) -> T {
        let state = self.state.lock().expect("memory store lock poisoned");
        state.rooms.get(&room.0).map(f).unwrap_or_default()
    }
}

#[async_trait]
impl StoreHandle for MemoryHandle {
    async fn insert_user(
        &mut self,
        user: &UserId,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        if state.users.contains_key(user.as_str()) {
            return Ok(false);
        }
        state
            .users
            .insert(user.as_str().to_owned(), password_hash.to_owned());
        Ok(true)
    }

    async fn password_hash(&mut self, user: &UserId) -> Result<Option<String>, StoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        Ok(state.users.get(user.as_str()).cloned())
    }

    async fn existing_users(&mut self, candidates: &[UserId]) -> Result<Vec<UserId>, StoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        let mut found = Vec::new();
        for candidate in candidates {
            if state.users.contains_key(candidate.as_str()) && !found.contains(candidate) {
                found.push(candidate.clone());
            }
        }
        Ok(found)
    }

    async fn create_room(&mut self, display_name: Option<&str>) -> Result<RoomId, StoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        state.next_room += 1;
        let id = state.next_room;
        state.rooms.insert(
            id,
            MemoryRoom {
                display_name: display_name.map(str::to_owned),
                last_seq: 0,
                members: BTreeMap::new(),
                messages: Vec::new(),
            },
        );
        Ok(RoomId(id))
    }

    async fn room(&mut self, room: RoomId) -> Result<Option<Room>, StoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        Ok(state.rooms.get(&room.0).map(|entry| Room {
            id: room,
            display_name: entry.display_name.clone(),
        }))
    }

    async fn memberships_of_user(
        &mut self,
        user: &UserId,
    ) -> Result<Vec<Membership>, StoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        Ok(state
            .rooms
            .iter()
            .filter_map(|(room_id, room)| {
                room.members.get(user.as_str()).map(|last_read| Membership {
                    room_id: RoomId(*room_id),
                    user_id: user.clone(),
                    last_read: MessageId(*last_read),
                })
            })
            .collect())
    }

    async fn members_of_room(&mut self, room: RoomId) -> Result<Vec<MemberEntry>, StoreError> {
        Ok(self.read_room(room, |entry| {
            entry
                .members
                .iter()
                .map(|(user, last_read)| MemberEntry {
                    user_id: UserId::parse(user.as_str()).expect("stored user ids are valid"),
                    last_read: MessageId(*last_read),
                })
                .collect()
        }))
    }

    async fn is_member(&mut self, room: RoomId, user: &UserId) -> Result<bool, StoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        Ok(state
            .rooms
            .get(&room.0)
            .map(|entry| entry.members.contains_key(user.as_str()))
            .unwrap_or(false))
    }

    async fn enroll_members(
        &mut self,
        room: RoomId,
        users: &[UserId],
        last_read: MessageId,
    ) -> Result<(), StoreError> {
        self.with_room(room, |entry| {
            for user in users {
                entry
                    .members
                    .entry(user.as_str().to_owned())
                    .or_insert(last_read.0);
            }
        })
    }

    async fn addable_users(
        &mut self,
        room: RoomId,
        candidates: &[UserId],
    ) -> Result<Vec<UserId>, StoreError> {
        let state = self.state.lock().expect("memory store lock poisoned");
        let mut found = Vec::new();
        for candidate in candidates {
            let exists = state.users.contains_key(candidate.as_str());
            let already_member = state
                .rooms
                .get(&room.0)
                .map(|entry| entry.members.contains_key(candidate.as_str()))
                .unwrap_or(false);
            if exists && !already_member && !found.contains(candidate) {
                found.push(candidate.clone());
            }
        }
        Ok(found)
    }

    async fn append_message(
        &mut self,
        room: RoomId,
        draft: MessageDraft,
    ) -> Result<Message, StoreError> {
        self.with_room(room, |entry| {
            entry.last_seq += 1;
            let message = Message {
                id: MessageId(entry.last_seq),
                author: draft.author,
                kind: draft.kind,
                answer_to: draft.answer_to,
                content: draft.content,
                sent_on: Utc::now(),
            };
            entry.messages.push(message.clone());
            message
        })
    }

    async fn latest_message(&mut self, room: RoomId) -> Result<Option<Message>, StoreError> {
        Ok(self.read_room(room, |entry| entry.messages.last().cloned()))
    }

    async fn messages_before(
        &mut self,
        room: RoomId,
        before: Option<MessageId>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self.read_room(room, |entry| {
            let mut selected: Vec<Message> = entry
                .messages
                .iter()
                .filter(|message| before.map(|bound| message.id < bound).unwrap_or(true))
                .cloned()
                .collect();
            selected.reverse();
            if let Some(limit) = limit {
                selected.truncate(limit.max(0) as usize);
            }
            selected
        }))
    }

    async fn mark_read(
        &mut self,
        room: RoomId,
        user: &UserId,
        up_to: MessageId,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        let Some(entry) = state.rooms.get_mut(&room.0) else {
            return Ok(0);
        };
        match entry.members.get_mut(user.as_str()) {
            Some(last_read) => {
                *last_read = up_to.0;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
