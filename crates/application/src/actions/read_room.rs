//! `readRoom`：把 (请求者, 房间) 的已读指针推到指定消息。
//!
//! 恰好一行受影响才算成功；零行说明请求者不在那个房间。成功时
//! 不回任何帧，也不广播。重复提交同一个序号是幂等的。

use domain::MessageId;
use serde::Deserialize;

use super::{ActionContext, ActionResult};
use crate::broadcast::send_json;
use crate::protocol::{Action, ErrorFrame};
use crate::store::{StoreGateway, StoreHandle};

const NOT_IN_ROOM: &str = "User not in specified room.";

#[derive(Debug, Deserialize)]
struct ReadRoomRequest {
    #[serde(rename = "roomID")]
    room_id: Option<i64>,
    #[serde(rename = "messageID")]
    message_id: Option<i64>,
}

pub(super) async fn run(ctx: &ActionContext<'_>) -> ActionResult {
    let action = Action::ReadRoom;
    let parsed: Option<(i64, i64)> = serde_json::from_value::<ReadRoomRequest>(ctx.raw.clone())
        .ok()
        .and_then(|request| request.room_id.zip(request.message_id));
    let Some((room, message)) = parsed else {
        send_json(
            ctx.sink,
            &ErrorFrame::invalid_request(action, NOT_IN_ROOM, ctx.raw),
        );
        return Ok(());
    };

    let mut store = ctx.gateway.acquire().await?;
    let affected = store
        .mark_read(room.into(), ctx.user, MessageId(message))
        .await?;

    if affected != 1 {
        send_json(
            ctx.sink,
            &ErrorFrame::invalid_request(action, NOT_IN_ROOM, ctx.raw),
        );
    }
    Ok(())
}
