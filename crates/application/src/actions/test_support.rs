//! 动作处理器测试支撑：内存存储加可捕获的出站帧。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use domain::UserId;
use serde_json::Value;

use crate::actions::{dispatch, ActionContext};
use crate::broadcast::{Broadcaster, FrameSink, SinkClosed};
use crate::memory::MemoryStore;
use crate::protocol::Action;
use crate::store::{StoreGateway, StoreHandle};

/// 记录写给请求方的全部帧。
#[derive(Default, Clone)]
pub struct CaptureSink {
    frames: Arc<Mutex<Vec<Value>>>,
}

impl CaptureSink {
    pub fn frames(&self) -> Vec<Value> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameSink for CaptureSink {
    fn send_text(&self, frame: String) -> Result<(), SinkClosed> {
        let value = serde_json::from_str(&frame).expect("outbound frames are JSON");
        self.frames.lock().unwrap().push(value);
        Ok(())
    }
}

/// 记录每次广播的收件人与载荷。
#[derive(Default, Clone)]
pub struct CaptureBroadcaster {
    sent: Arc<Mutex<Vec<(Vec<UserId>, Value)>>>,
}

impl CaptureBroadcaster {
    pub fn sent(&self) -> Vec<(Vec<UserId>, Value)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broadcaster for CaptureBroadcaster {
    async fn broadcast_to(&self, recipients: &[UserId], frame: String) {
        let value = serde_json::from_str(&frame).expect("broadcast frames are JSON");
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), value));
    }
}

pub struct Fixture {
    pub store: MemoryStore,
    pub sink: CaptureSink,
    pub broadcaster: CaptureBroadcaster,
}

impl Fixture {
    /// 预置一批账号的内存环境。
    pub async fn with_users(names: &[&str]) -> Self {
        let store = MemoryStore::default();
        let mut handle = store.acquire().await.unwrap();
        for name in names {
            let user = UserId::parse(*name).unwrap();
            handle.insert_user(&user, "hash").await.unwrap();
        }
        Self {
            store,
            sink: CaptureSink::default(),
            broadcaster: CaptureBroadcaster::default(),
        }
    }

    pub async fn store_handle(&self) -> Box<dyn StoreHandle> {
        self.store.acquire().await.unwrap()
    }
}

/// 以指定身份执行一个动作，返回累计的应答帧与广播记录。
pub async fn run_action(
    fixture: &Fixture,
    user: &UserId,
    action: Action,
    raw: Value,
) -> (Vec<Value>, Vec<(Vec<UserId>, Value)>) {
    let ctx = ActionContext {
        user,
        raw: &raw,
        sink: &fixture.sink,
        gateway: &fixture.store,
        broadcaster: &fixture.broadcaster,
    };
    dispatch(action, ctx).await;
    (fixture.sink.frames(), fixture.broadcaster.sent())
}
