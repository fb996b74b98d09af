//! 连接写入与房间广播能力
//!
//! 处理器通过 [`FrameSink`] 写自己的应答帧，通过 [`Broadcaster`]
//! 通知房间里的其他成员；两者都是尽力而为，失败只进日志。

use async_trait::async_trait;
use domain::UserId;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("connection outbox closed")]
pub struct SinkClosed;

/// 单个连接的出站帧写入端。
pub trait FrameSink: Send + Sync {
    fn send_text(&self, frame: String) -> Result<(), SinkClosed>;
}

/// 把帧序列化后写给连接；对端已断开时静默放弃。
pub fn send_json<T: Serialize>(sink: &dyn FrameSink, frame: &T) {
    match serde_json::to_string(frame) {
        Ok(text) => {
            if sink.send_text(text).is_err() {
                tracing::debug!("connection closed before the response could be written");
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize outbound frame");
        }
    }
}

/// 房间事件的扇出能力。
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// 给每个仍在线的收件人投递一份帧。
    ///
    /// 单个收件人投递失败不会中断其余投递，也不会作为错误返回。
    async fn broadcast_to(&self, recipients: &[UserId], frame: String);
}

/// 序列化一次、扇出给所有收件人。
pub async fn broadcast_json<T: Serialize>(
    broadcaster: &dyn Broadcaster,
    recipients: &[UserId],
    frame: &T,
) {
    match serde_json::to_string(frame) {
        Ok(text) => broadcaster.broadcast_to(recipients, text).await,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize broadcast frame");
        }
    }
}
