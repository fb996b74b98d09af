//! 帧分发器
//!
//! 每条连接一份会话状态：`Unauthenticated`（尚未绑定身份）→
//! `Bound`（最近一帧携带的凭证有效）→ `Closed`。每一帧独立走
//! 解析 → 凭证校验 → 注册表绑定 → 动作分发；一帧完整处理完
//! （包括处理器里的异步 I/O）之前不读下一帧，保证单连接内的
//! 操作顺序。

use std::sync::Arc;

use serde_json::Value;

use application::protocol::{invalid_token_reason, Action, Envelope, ErrorFrame, CLOSE_INVALID_TOKEN};
use application::{dispatch, send_json, ActionContext, Broadcaster, StoreGateway, TokenVerifier};
use domain::UserId;

use crate::registry::{ConnectionHandle, ConnectionRegistry};

/// 一帧处理完后连接的去向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// 连接保持打开，继续读下一帧。
    Continue,
    /// 连接已关闭（凭证被拒或被顶替），停止读取。
    Close,
}

/// 单条连接在分发器里的会话状态。
pub struct ConnectionSession {
    handle: ConnectionHandle,
    /// 最近一次成功绑定的身份。
    bound: Option<UserId>,
    /// 连接最近出示过的凭证，仅用于日志。
    last_token: Option<String>,
}

impl ConnectionSession {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            bound: None,
            last_token: None,
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn identity(&self) -> Option<&UserId> {
        self.bound.as_ref()
    }

    /// 连接最近出示过的凭证原文。
    pub fn last_token(&self) -> Option<&str> {
        self.last_token.as_deref()
    }
}

/// 入站帧的认证与路由核心。
pub struct Dispatcher {
    verifier: Arc<dyn TokenVerifier>,
    gateway: Arc<dyn StoreGateway>,
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        gateway: Arc<dyn StoreGateway>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            verifier,
            gateway,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 处理一条文本帧。
    pub async fn handle_text(
        &self,
        session: &mut ConnectionSession,
        raw: &str,
    ) -> FrameDisposition {
        // 被顶替的连接可能还有在途的帧，一律不再处理
        if !session.handle.is_live() {
            return FrameDisposition::Close;
        }

        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => {
                send_json(&session.handle, &ErrorFrame::not_json(raw));
                return FrameDisposition::Continue;
            }
        };
        let envelope: Envelope = match serde_json::from_value(value.clone()) {
            Ok(envelope) => envelope,
            Err(_) => {
                send_json(&session.handle, &ErrorFrame::not_json(raw));
                return FrameDisposition::Continue;
            }
        };

        session.last_token = envelope.token.clone();
        let token = envelope.token.unwrap_or_default();
        let user = match self.verifier.verify(&token) {
            Ok(user) => user,
            Err(err) => {
                tracing::info!(
                    remote = session.handle.remote(),
                    error = %err,
                    "closing connection over rejected credential"
                );
                session.handle.close(CLOSE_INVALID_TOKEN, invalid_token_reason(&token));
                self.finish(session).await;
                return FrameDisposition::Close;
            }
        };

        // 凭证中途换了身份：先解除旧映射再绑定新身份
        if let Some(previous) = session.bound.as_ref() {
            if *previous != user {
                tracing::info!(
                    remote = session.handle.remote(),
                    old = %previous,
                    new = %user,
                    "connection switched identity"
                );
                self.registry.release(previous, session.handle.id()).await;
            }
        }
        if !self.registry.bind(&user, &session.handle).await {
            // 绑定竞争中输给了更新的连接
            session.bound = None;
            return FrameDisposition::Close;
        }
        session.bound = Some(user.clone());

        let Some(action) = envelope.action.as_deref().and_then(Action::from_name) else {
            send_json(
                &session.handle,
                &ErrorFrame::unknown_action(envelope.action.as_deref().unwrap_or_default()),
            );
            return FrameDisposition::Continue;
        };

        tracing::debug!(
            remote = session.handle.remote(),
            user = %user,
            action = action.name(),
            "dispatching action"
        );
        dispatch(
            action,
            ActionContext {
                user: &user,
                raw: &value,
                sink: &session.handle,
                gateway: self.gateway.as_ref(),
                broadcaster: self.registry.as_ref() as &dyn Broadcaster,
            },
        )
        .await;
        FrameDisposition::Continue
    }

    /// 二进制帧不在协议内，回协议错误，连接保持打开。
    pub async fn handle_binary(&self, session: &ConnectionSession) {
        send_json(&session.handle, &ErrorFrame::binary_data());
    }

    /// 传输层关闭（对端断开或被顶替）后的清理；幂等。
    pub async fn finish(&self, session: &mut ConnectionSession) {
        if let Some(user) = session.bound.take() {
            self.registry.release(&user, session.handle.id()).await;
        }
    }
}
