//! `sendMessage`：向房间追加一条消息并广播。
//!
//! 校验顺序与响应语义：类型必须是 message/picture/answer，answer 必须
//! 引用一条消息，content 必须存在；发送者必须是房间成员。写入成功后
//! 先给发送者回执（带 requestID），再把 `newMessages` 事件广播给
//! 包括发送者在内的全部成员，发送者的其他设备也要看到这条消息。

use domain::{MessageDraft, MessageId, MessageKind, UserId};
use serde::Deserialize;
use serde_json::Value;

use super::{ActionContext, ActionResult};
use crate::broadcast::{broadcast_json, send_json};
use crate::protocol::{Action, ErrorFrame, NewMessagesEvent, SendMessageAck, WireMessage};
use crate::store::{StoreGateway, StoreHandle};

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    room: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "answerToMessageID")]
    answer_to: Option<i64>,
    content: Option<String>,
    #[serde(rename = "requestID")]
    request_id: Option<Value>,
}

pub(super) async fn run(ctx: &ActionContext<'_>) -> ActionResult {
    let action = Action::SendMessage;
    let request: SendMessageRequest = match serde_json::from_value(ctx.raw.clone()) {
        Ok(request) => request,
        Err(_) => {
            send_json(
                ctx.sink,
                &ErrorFrame::missing_data(action, "No valid type provided"),
            );
            return Ok(());
        }
    };

    let Some(kind) = request
        .kind
        .as_deref()
        .and_then(MessageKind::parse_client)
    else {
        send_json(
            ctx.sink,
            &ErrorFrame::missing_data(action, "No valid type provided"),
        );
        return Ok(());
    };
    let Some(content) = request.content else {
        send_json(
            ctx.sink,
            &ErrorFrame::missing_data(action, "No content provided"),
        );
        return Ok(());
    };
    let draft = match MessageDraft::new(
        ctx.user.clone(),
        kind,
        request.answer_to.map(MessageId),
        content,
    ) {
        Ok(draft) => draft,
        Err(_) => {
            send_json(
                ctx.sink,
                &ErrorFrame::missing_data(action, "Answer needs answer to MessageID"),
            );
            return Ok(());
        }
    };
    let Some(room) = request.room.map(Into::into) else {
        send_json(
            ctx.sink,
            &ErrorFrame::missing_data(action, "room must be set."),
        );
        return Ok(());
    };

    let mut store = ctx.gateway.acquire().await?;

    let members = store.members_of_room(room).await?;
    if !members.iter().any(|member| member.user_id == *ctx.user) {
        send_json(
            ctx.sink,
            &ErrorFrame::missing_data(action, "User not in Room"),
        );
        return Ok(());
    }

    let message = store.append_message(room, draft).await?;
    // 广播前释放存储句柄
    drop(store);

    send_json(
        ctx.sink,
        &SendMessageAck {
            action: action.name(),
            request_id: request.request_id,
            message_status: "ok",
        },
    );

    let recipients: Vec<UserId> = members.into_iter().map(|member| member.user_id).collect();
    let event = NewMessagesEvent::single(room.into(), WireMessage::from(&message));
    broadcast_json(ctx.broadcaster, &recipients, &event).await;
    Ok(())
}
