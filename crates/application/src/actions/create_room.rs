//! `createRoom`：建房并拉入受邀成员。
//!
//! 私聊房间：邀请人加上恰好一位被邀请人，两者都必须存在，否则整体
//! 拒绝。公开房间：invite 数组里至少要有一个真实用户；查无此人的
//! 名字放进 `invalidUsers` 报告，但不阻止建房。建房成功后写入一条
//! 系统消息、把有效成员的已读指针置零，并把系统消息广播给他们。

use domain::{MessageDraft, MessageId, UserId};
use serde::Deserialize;
use serde_json::Value;

use super::{left_out, names_from_array, parseable_users, ActionContext, ActionResult};
use crate::broadcast::{broadcast_json, send_json};
use crate::protocol::{
    Action, CreateRoomRejected, CreateRoomResponse, ErrorFrame, NewMessagesEvent, WireMessage,
    ROOM_STATUS_INVALID, ROOM_STATUS_OK, ROOM_STATUS_PARTIAL,
};
use crate::store::{StoreGateway, StoreHandle};

#[derive(Debug, Deserialize)]
struct CreateRoomRequest {
    #[serde(rename = "roomType")]
    room_type: Option<String>,
    #[serde(rename = "roomName")]
    room_name: Option<String>,
    invite: Option<Value>,
    #[serde(rename = "requestID")]
    request_id: Option<Value>,
}

pub(super) async fn run(ctx: &ActionContext<'_>) -> ActionResult {
    let action = Action::CreateRoom;
    let request: CreateRoomRequest = match serde_json::from_value(ctx.raw.clone()) {
        Ok(request) => request,
        Err(_) => {
            send_json(
                ctx.sink,
                &ErrorFrame::missing_data(action, "invite must be set."),
            );
            return Ok(());
        }
    };

    let is_private = request.room_type.as_deref() == Some("private");
    let room_name = request
        .room_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    if !is_private && room_name.is_none() {
        send_json(
            ctx.sink,
            &ErrorFrame::missing_data(action, "roomName must be set."),
        );
        return Ok(());
    }

    // 受邀列表：私聊是单个名字，公开房间是数组
    let invited: Vec<String> = match (&request.invite, is_private) {
        (Some(Value::String(name)), true) => vec![name.clone()],
        (Some(Value::Number(number)), true) => vec![number.to_string()],
        (Some(Value::Array(values)), false) => names_from_array(values),
        _ => {
            send_json(
                ctx.sink,
                &ErrorFrame::missing_data(action, "invite must be set."),
            );
            return Ok(());
        }
    };

    let mut users_to_test = invited;
    if is_private {
        users_to_test.push(ctx.user.to_string());
    }
    let candidates = parseable_users(&users_to_test);

    let mut store = ctx.gateway.acquire().await?;

    let existing = store.existing_users(&candidates).await?;
    let users_not_added = left_out(&users_to_test, &existing);

    if is_private && existing.len() != 2 {
        send_json(
            ctx.sink,
            &CreateRoomRejected {
                action: action.name(),
                request_id: request.request_id,
                room_status: ROOM_STATUS_INVALID,
                invalid_users: users_not_added,
                error_msg: "Private room needs exactly two users.".to_owned(),
            },
        );
        return Ok(());
    }
    if existing.is_empty() {
        send_json(
            ctx.sink,
            &CreateRoomRejected {
                action: action.name(),
                request_id: request.request_id,
                room_status: ROOM_STATUS_INVALID,
                invalid_users: users_not_added,
                error_msg: "Public room needs at least 1 person to be added.".to_owned(),
            },
        );
        return Ok(());
    }

    let display_name = if is_private { None } else { room_name };
    let room = store.create_room(display_name).await?;

    let announcement = match display_name {
        None => "Hello in your private chat room".to_owned(),
        Some(name) => format!("Room was created by {} with name {}.", ctx.user, name),
    };
    let system = store
        .append_message(room, MessageDraft::system(ctx.user.clone(), announcement))
        .await?;
    store
        .enroll_members(room, &existing, MessageId::ZERO)
        .await?;
    drop(store);

    send_json(
        ctx.sink,
        &CreateRoomResponse {
            action: action.name(),
            request_id: request.request_id,
            room_id: room.into(),
            room_status: if users_not_added.is_empty() {
                ROOM_STATUS_OK
            } else {
                ROOM_STATUS_PARTIAL
            },
            invalid_users: users_not_added,
        },
    );

    let recipients: Vec<UserId> = existing;
    let event = NewMessagesEvent::single(room.into(), WireMessage::from(&system));
    broadcast_json(ctx.broadcaster, &recipients, &event).await;
    Ok(())
}
