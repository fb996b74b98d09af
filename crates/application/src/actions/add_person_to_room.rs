//! `addPersonToRoom`：把一批用户拉进公开房间。
//!
//! 发起人自己必须已经在房间里，私聊房间一律拒绝加人。候选名单先过
//! 一遍"存在且尚未入房"的筛选；新成员的已读指针初始化为房间当前
//! 最新一条消息的序号，这样他们不会背上一屏历史未读。随后写一条
//! 系统消息，广播给旧成员与新成员的并集。

use std::collections::HashSet;

use domain::{MessageDraft, MessageId, RoomKind, UserId};
use serde::Deserialize;
use serde_json::Value;

use super::{left_out, names_from_array, parseable_users, ActionContext, ActionResult};
use crate::broadcast::{broadcast_json, send_json};
use crate::protocol::{
    Action, AddPersonResponse, ErrorFrame, NewMessagesEvent, WireMessage, ROOM_STATUS_OK,
    ROOM_STATUS_PARTIAL,
};
use crate::store::{StoreGateway, StoreHandle};

const USERS_ADDED_MESSAGE: &str = "Users were added to the room";

#[derive(Debug, Deserialize)]
struct AddPersonRequest {
    #[serde(rename = "roomID")]
    room_id: Option<i64>,
    users: Option<Value>,
}

pub(super) async fn run(ctx: &ActionContext<'_>) -> ActionResult {
    let action = Action::AddPersonToRoom;
    let request: AddPersonRequest = match serde_json::from_value(ctx.raw.clone()) {
        Ok(request) => request,
        Err(_) => {
            send_json(
                ctx.sink,
                &ErrorFrame::missing_data(
                    action,
                    "To add users they need to be specified in a array.",
                ),
            );
            return Ok(());
        }
    };

    let requested = match &request.users {
        Some(Value::Array(values)) if !values.is_empty() => names_from_array(values),
        _ => {
            send_json(
                ctx.sink,
                &ErrorFrame::missing_data(
                    action,
                    "To add users they need to be specified in a array.",
                ),
            );
            return Ok(());
        }
    };
    let Some(room) = request.room_id.map(Into::into) else {
        send_json(
            ctx.sink,
            &ErrorFrame::missing_data(action, "roomID must be set."),
        );
        return Ok(());
    };

    let mut store = ctx.gateway.acquire().await?;

    let room_record = store.room(room).await?;
    let is_requester_member = store.is_member(room, ctx.user).await?;
    let Some(room_record) = room_record.filter(|_| is_requester_member) else {
        send_json(
            ctx.sink,
            &ErrorFrame::invalid_request(
                action,
                "User can't add persons to a room he isn't in himself.",
                ctx.raw,
            ),
        );
        return Ok(());
    };
    if room_record.kind() == RoomKind::Private {
        send_json(
            ctx.sink,
            &ErrorFrame::invalid_request(action, "Can't add user to a private room.", ctx.raw),
        );
        return Ok(());
    }

    let candidates = parseable_users(&requested);
    let users_to_add = store.addable_users(room, &candidates).await?;
    if users_to_add.is_empty() {
        send_json(
            ctx.sink,
            &ErrorFrame::missing_data(action, "No valid users to Add"),
        );
        return Ok(());
    }
    let users_not_added = left_out(&requested, &users_to_add);

    // 入房前的成员与最新消息序号：新成员不应把旧历史算成未读
    let previous_members = store.members_of_room(room).await?;
    let last_message_id = store
        .latest_message(room)
        .await?
        .map(|message| message.id)
        .unwrap_or(MessageId::ZERO);

    store
        .enroll_members(room, &users_to_add, last_message_id)
        .await?;
    let system = store
        .append_message(
            room,
            MessageDraft::system(ctx.user.clone(), USERS_ADDED_MESSAGE),
        )
        .await?;
    drop(store);

    send_json(
        ctx.sink,
        &AddPersonResponse {
            action: action.name(),
            room_id: room.into(),
            room_status: if users_not_added.is_empty() {
                ROOM_STATUS_OK
            } else {
                ROOM_STATUS_PARTIAL
            },
            invalid_users: users_not_added,
        },
    );

    // 广播对象：原有成员与新成员的并集
    let mut recipients: Vec<UserId> = previous_members
        .into_iter()
        .map(|member| member.user_id)
        .collect();
    let known: HashSet<&str> = recipients.iter().map(UserId::as_str).collect();
    let fresh: Vec<UserId> = users_to_add
        .iter()
        .filter(|user| !known.contains(user.as_str()))
        .cloned()
        .collect();
    recipients.extend(fresh);

    let event = NewMessagesEvent::single(room.into(), WireMessage::from(&system));
    broadcast_json(ctx.broadcaster, &recipients, &event).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use domain::{MessageDraft, MessageId, MessageKind, RoomId, UserId};
    use serde_json::json;

    use crate::actions::test_support::{run_action, Fixture};
    use crate::protocol::Action;
    use crate::store::StoreHandle;

    async fn public_room(fixture: &Fixture, members: &[&str], messages: usize) -> i64 {
        let mut store = fixture.store_handle().await;
        let room = store.create_room(Some("general")).await.unwrap();
        let users: Vec<UserId> = members
            .iter()
            .map(|name| UserId::parse(*name).unwrap())
            .collect();
        store
            .enroll_members(room, &users, MessageId::ZERO)
            .await
            .unwrap();
        for index in 0..messages {
            let draft = MessageDraft::new(
                users[0].clone(),
                MessageKind::Message,
                None,
                format!("m{}", index),
            )
            .unwrap();
            store.append_message(room, draft).await.unwrap();
        }
        room.into()
    }

    #[tokio::test]
    async fn adds_members_with_read_pointer_at_latest_message() {
        let fixture = Fixture::with_users(&["alice", "bob", "carol"]).await;
        let alice = UserId::parse("alice").unwrap();
        let room = public_room(&fixture, &["alice", "bob"], 4).await;

        let (frames, broadcasts) = run_action(
            &fixture,
            &alice,
            Action::AddPersonToRoom,
            json!({"roomID": room, "users": ["carol", "ghost"]}),
        )
        .await;

        let response = &frames[0];
        assert_eq!(response["action"], "addPersonToRoom");
        assert_eq!(response["roomStatus"], "partially added users");
        assert_eq!(response["invalidUsers"], json!(["ghost"]));

        let mut store = fixture.store_handle().await;
        let members = store.members_of_room(RoomId(room)).await.unwrap();
        let carol = members
            .iter()
            .find(|m| m.user_id.as_str() == "carol")
            .unwrap();
        // 入房时房间里已有 4 条消息，新成员从第 4 条之后开始算未读
        assert_eq!(i64::from(carol.last_read), 4);
        drop(store);

        // 广播覆盖旧成员与新成员
        let (recipients, event) = &broadcasts[0];
        let names: Vec<&str> = recipients.iter().map(|u| u.as_str()).collect();
        assert!(names.contains(&"alice"));
        assert!(names.contains(&"bob"));
        assert!(names.contains(&"carol"));
        assert_eq!(
            event["data"][0]["messages"][0]["content"],
            "Users were added to the room"
        );
    }

    #[tokio::test]
    async fn private_rooms_reject_additions_regardless_of_membership() {
        let fixture = Fixture::with_users(&["alice", "bob", "carol"]).await;
        let alice = UserId::parse("alice").unwrap();

        let mut store = fixture.store_handle().await;
        let room = store.create_room(None).await.unwrap();
        store
            .enroll_members(
                room,
                &[alice.clone(), UserId::parse("bob").unwrap()],
                MessageId::ZERO,
            )
            .await
            .unwrap();
        drop(store);

        let (frames, broadcasts) = run_action(
            &fixture,
            &alice,
            Action::AddPersonToRoom,
            json!({"roomID": i64::from(room), "users": ["carol"], "token": "jwt"}),
        )
        .await;

        assert_eq!(frames[0]["message"], "Can't add user to a private room.");
        // 回显的请求不能带凭证原文
        assert_eq!(frames[0]["request"]["token"], "[redacted]");
        assert!(broadcasts.is_empty());
    }

    #[tokio::test]
    async fn requester_must_already_be_a_member() {
        let fixture = Fixture::with_users(&["alice", "mallory", "carol"]).await;
        let mallory = UserId::parse("mallory").unwrap();
        let room = public_room(&fixture, &["alice"], 1).await;

        let (frames, _) = run_action(
            &fixture,
            &mallory,
            Action::AddPersonToRoom,
            json!({"roomID": room, "users": ["carol"]}),
        )
        .await;

        assert_eq!(
            frames[0]["message"],
            "User can't add persons to a room he isn't in himself."
        );
    }

    #[tokio::test]
    async fn all_candidates_invalid_is_a_missing_data_error() {
        let fixture = Fixture::with_users(&["alice", "bob"]).await;
        let alice = UserId::parse("alice").unwrap();
        let room = public_room(&fixture, &["alice", "bob"], 1).await;

        // ghost 不存在，bob 已在房里
        let (frames, broadcasts) = run_action(
            &fixture,
            &alice,
            Action::AddPersonToRoom,
            json!({"roomID": room, "users": ["ghost", "bob"]}),
        )
        .await;

        assert_eq!(frames[0]["message"], "No valid users to Add");
        assert!(broadcasts.is_empty());
    }

    #[tokio::test]
    async fn users_must_be_an_array() {
        let fixture = Fixture::with_users(&["alice"]).await;
        let alice = UserId::parse("alice").unwrap();

        let (frames, _) = run_action(
            &fixture,
            &alice,
            Action::AddPersonToRoom,
            json!({"roomID": 1, "users": "carol"}),
        )
        .await;

        assert_eq!(
            frames[0]["message"],
            "To add users they need to be specified in a array."
        );
    }
}
