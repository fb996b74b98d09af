//! `getMessages`：拉取一个房间的消息。
//!
//! 只有房间成员可以拉取；支持 `startFromID`（只取序号严格小于它的
//! 消息）和 `maxCount`（只取最近 N 条）两个可选分页参数。内部按
//! 序号倒序查询，返回给客户端之前翻回正序。

use domain::MessageId;
use serde::Deserialize;

use super::{ActionContext, ActionResult};
use crate::broadcast::send_json;
use crate::protocol::{Action, ErrorFrame, MessagesResponse, WireMessage};
use crate::store::{StoreGateway, StoreHandle};

#[derive(Debug, Deserialize)]
struct GetMessagesRequest {
    room: Option<i64>,
    #[serde(rename = "startFromID")]
    start_from_id: Option<i64>,
    #[serde(rename = "maxCount")]
    max_count: Option<i64>,
}

pub(super) async fn run(ctx: &ActionContext<'_>) -> ActionResult {
    let action = Action::GetMessages;
    let request: GetMessagesRequest = match serde_json::from_value(ctx.raw.clone()) {
        Ok(request) => request,
        Err(_) => {
            send_json(
                ctx.sink,
                &ErrorFrame::missing_data(action, "room must be set."),
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

    if !store.is_member(room, ctx.user).await? {
        send_json(
            ctx.sink,
            &ErrorFrame::missing_data(action, "User not in Room"),
        );
        return Ok(());
    }

    let limit = request.max_count.filter(|count| *count > 0);
    let mut messages = store
        .messages_before(room, request.start_from_id.map(MessageId), limit)
        .await?;
    messages.reverse();

    send_json(
        ctx.sink,
        &MessagesResponse {
            action: action.name(),
            messages: messages.iter().map(WireMessage::from).collect(),
        },
    );
    Ok(())
}
