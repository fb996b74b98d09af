//! 连接注册表
//!
//! 维护"身份 → 当前连接"的唯一映射。任何时刻每个身份至多一条活跃
//! 连接：新连接以同一身份通过校验时，旧连接先收到 superseded 关闭，
//! 映射随后被覆盖。所有变更都经过同一把锁，过期的关闭事件不会误删
//! 新的绑定。注册表同时实现房间广播的扇出原语。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use application::protocol::{CLOSE_SUPERSEDED, SUPERSEDED_REASON};
use application::{Broadcaster, FrameSink, SinkClosed};
use domain::UserId;

/// 发往单个连接的出站指令，由连接自己的发送任务排空。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// 连接在注册表中的非拥有句柄。
///
/// 连接本体归传输任务所有；句柄只携带出站通道和关闭标记，
/// 克隆开销很小。
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    remote: String,
    outbox: mpsc::UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn new(remote: impl Into<String>, outbox: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote: remote.into(),
            outbox,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.outbox.is_closed()
    }

    /// 请求关闭连接；幂等，重复调用只会发出一条关闭指令。
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.outbox.send(Outbound::Close {
                code,
                reason: reason.into(),
            });
        }
    }

    fn push_text(&self, frame: String) -> Result<(), SinkClosed> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SinkClosed);
        }
        self.outbox
            .send(Outbound::Text(frame))
            .map_err(|_| SinkClosed)
    }
}

impl FrameSink for ConnectionHandle {
    fn send_text(&self, frame: String) -> Result<(), SinkClosed> {
        self.push_text(frame)
    }
}

/// 身份 → 活跃连接的注册表。
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<UserId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把身份绑定到连接。
    ///
    /// 已有其他连接占用该身份时，旧连接在映射被覆盖之前收到
    /// superseded 关闭。若这条连接自身已被关闭（比如刚刚被别的
    /// 绑定顶掉），则拒绝绑定并返回 `false`。
    pub async fn bind(&self, user: &UserId, handle: &ConnectionHandle) -> bool {
        let mut entries = self.entries.lock().await;
        if !handle.is_live() {
            return false;
        }
        match entries.get(user) {
            Some(current) if current.id == handle.id => return true,
            Some(current) => {
                tracing::info!(
                    user = %user,
                    old_connection = %current.id,
                    new_connection = %handle.id,
                    "superseding connection"
                );
                current.close(CLOSE_SUPERSEDED, SUPERSEDED_REASON);
            }
            None => {}
        }
        entries.insert(user.clone(), handle.clone());
        true
    }

    /// 解除绑定；仅当映射仍指向这条连接时才移除。
    ///
    /// 幂等：迟到的关闭事件不会删掉同一身份更新的连接。
    pub async fn release(&self, user: &UserId, connection: Uuid) {
        let mut entries = self.entries.lock().await;
        if entries.get(user).map(|handle| handle.id) == Some(connection) {
            entries.remove(user);
            tracing::debug!(user = %user, connection = %connection, "registry entry removed");
        }
    }

    /// 当前绑定的连接句柄（若有）。
    pub async fn connection_for(&self, user: &UserId) -> Option<ConnectionHandle> {
        self.entries.lock().await.get(user).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl Broadcaster for ConnectionRegistry {
    async fn broadcast_to(&self, recipients: &[UserId], frame: String) {
        // 锁内只取句柄快照，投递在锁外进行
        let targets: Vec<(UserId, ConnectionHandle)> = {
            let entries = self.entries.lock().await;
            recipients
                .iter()
                .filter_map(|user| {
                    entries
                        .get(user)
                        .map(|handle| (user.clone(), handle.clone()))
                })
                .collect()
        };

        for (user, handle) in targets {
            if handle.push_text(frame.clone()).is_err() {
                tracing::warn!(
                    user = %user,
                    connection = %handle.id(),
                    "broadcast delivery failed, connection already gone"
                );
            }
        }
    }
}
