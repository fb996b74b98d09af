//! WebSocket 传输层
//!
//! 升级不做鉴权：身份跟着每一帧里的凭证走，由分发器逐帧校验。
//! 每条连接拆成两个任务：发送任务排空 outbox 把帧写进 socket，
//! 接收循环把入站帧交给分发器，并且严格串行：上一帧的处理器
//! 完整跑完之前不读下一帧。

use axum::{
    extract::{
        ws::{CloseFrame, Message as WsMessage, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::sync::mpsc;

use infrastructure::{ConnectionHandle, ConnectionSession, FrameDisposition, Outbound};

use crate::state::AppState;

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr) {
    tracing::info!(remote = %addr, "websocket connection accepted");

    let (mut sender, mut receiver) = socket.split();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<Outbound>();
    let handle = ConnectionHandle::new(addr.to_string(), outbox_tx);
    let connection_id = handle.id();
    let mut session = ConnectionSession::new(handle);

    // 发送任务：处理完 Close 指令后结束，顺带丢弃 outbox 剩余内容
    let send_task = tokio::spawn(async move {
        while let Some(item) = outbox_rx.recv().await {
            match item {
                Outbound::Text(text) => {
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = sender
                        .send(WsMessage::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
        tracing::debug!("websocket send task finished");
    });

    let dispatcher = state.dispatcher.clone();
    while let Some(frame) = receiver.next().await {
        // 被顶替的连接不再处理在途的帧
        if !session.handle().is_live() {
            break;
        }
        match frame {
            Ok(WsMessage::Text(text)) => {
                let disposition = dispatcher.handle_text(&mut session, text.as_str()).await;
                if disposition == FrameDisposition::Close {
                    break;
                }
            }
            Ok(WsMessage::Binary(_)) => {
                dispatcher.handle_binary(&session).await;
            }
            Ok(WsMessage::Close(_)) => {
                tracing::info!(remote = %addr, connection = %connection_id, "peer closed connection");
                break;
            }
            // axum 自动应答 ping
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
            Err(err) => {
                tracing::debug!(remote = %addr, error = %err, "websocket transport error");
                break;
            }
        }
    }

    dispatcher.finish(&mut session).await;
    drop(session);
    let _ = send_task.await;
    tracing::info!(remote = %addr, connection = %connection_id, "websocket connection cleaned up");
}
