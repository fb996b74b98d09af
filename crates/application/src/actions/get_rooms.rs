//! `getRooms`：列出请求者加入的全部房间。
//!
//! 每个房间带上类型、展示名（私聊房间取对方的身份）、成员的已读
//! 进度和最近一条消息。任何一个房间的数据取不全就整体失败，
//! 不返回残缺的房间列表。

use domain::RoomKind;

use super::{ActionContext, ActionResult};
use crate::broadcast::send_json;
use crate::protocol::{Action, RoomOverview, RoomsResponse, WireMember, WireMessage};
use crate::store::{StoreError, StoreGateway, StoreHandle};

pub(super) async fn run(ctx: &ActionContext<'_>) -> ActionResult {
    let mut store = ctx.gateway.acquire().await?;

    let memberships = store.memberships_of_user(ctx.user).await?;
    let mut rooms = Vec::with_capacity(memberships.len());

    for membership in memberships {
        let room = store
            .room(membership.room_id)
            .await?
            .ok_or_else(|| {
                StoreError::Query(format!("room {} vanished while listing", membership.room_id))
            })?;
        let members = store.members_of_room(room.id).await?;
        // 每个房间创建时都会写一条系统消息，取不到说明数据已损坏
        let last_message = store
            .latest_message(room.id)
            .await?
            .ok_or_else(|| StoreError::Query(format!("room {} has no messages", room.id)))?;

        let room_name = match room.kind() {
            RoomKind::Public => room.display_name.clone().unwrap_or_default(),
            RoomKind::Private => members
                .iter()
                .map(|member| &member.user_id)
                .find(|member| *member != ctx.user)
                .map(ToString::to_string)
                .unwrap_or_else(|| ctx.user.to_string()),
        };

        rooms.push(RoomOverview {
            room_id: room.id.into(),
            room_type: match room.kind() {
                RoomKind::Private => "private",
                RoomKind::Public => "public",
            },
            room_name,
            last_read_message: membership.last_read.into(),
            members: members
                .iter()
                .map(|member| WireMember {
                    user_id: member.user_id.to_string(),
                    last_message_read: member.last_read.into(),
                })
                .collect(),
            last_message: WireMessage::from(&last_message),
        });
    }

    send_json(
        ctx.sink,
        &RoomsResponse {
            action: Action::GetRooms.name(),
            rooms,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use domain::{MessageDraft, MessageId, UserId};
    use serde_json::json;

    use crate::actions::test_support::{run_action, Fixture};
    use crate::protocol::Action;
    use crate::store::StoreHandle;

    #[tokio::test]
    async fn lists_rooms_with_members_and_last_message() {
        let fixture = Fixture::with_users(&["alice", "bob"]).await;
        let alice = UserId::parse("alice").unwrap();
        let bob = UserId::parse("bob").unwrap();

        let mut store = fixture.store_handle().await;
        let room = store.create_room(Some("general")).await.unwrap();
        store
            .append_message(room, MessageDraft::system(alice.clone(), "room created"))
            .await
            .unwrap();
        store
            .enroll_members(room, &[alice.clone(), bob.clone()], MessageId::ZERO)
            .await
            .unwrap();
        drop(store);

        let (frames, _) = run_action(&fixture, &alice, Action::GetRooms, json!({})).await;
        assert_eq!(frames.len(), 1);
        let response = &frames[0];
        assert_eq!(response["action"], "getRooms");
        let rooms = response["rooms"].as_array().unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0]["roomType"], "public");
        assert_eq!(rooms[0]["roomName"], "general");
        assert_eq!(rooms[0]["lastReadMessage"], 0);
        assert_eq!(rooms[0]["members"].as_array().unwrap().len(), 2);
        assert_eq!(rooms[0]["lastMessage"]["type"], "system");
    }

    #[tokio::test]
    async fn private_room_is_named_after_the_other_member() {
        let fixture = Fixture::with_users(&["alice", "bob"]).await;
        let alice = UserId::parse("alice").unwrap();
        let bob = UserId::parse("bob").unwrap();

        let mut store = fixture.store_handle().await;
        let room = store.create_room(None).await.unwrap();
        store
            .append_message(room, MessageDraft::system(alice.clone(), "hello"))
            .await
            .unwrap();
        store
            .enroll_members(room, &[alice.clone(), bob.clone()], MessageId::ZERO)
            .await
            .unwrap();
        drop(store);

        let (frames, _) = run_action(&fixture, &bob, Action::GetRooms, json!({})).await;
        let rooms = frames[0]["rooms"].as_array().unwrap();
        assert_eq!(rooms[0]["roomType"], "private");
        assert_eq!(rooms[0]["roomName"], "alice");
    }

    #[tokio::test]
    async fn user_without_rooms_gets_an_empty_list() {
        let fixture = Fixture::with_users(&["alice"]).await;
        let alice = UserId::parse("alice").unwrap();

        let (frames, _) = run_action(&fixture, &alice, Action::GetRooms, json!({})).await;
        assert_eq!(frames[0]["rooms"].as_array().unwrap().len(), 0);
    }
}
