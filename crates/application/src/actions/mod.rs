//! 动作处理器
//!
//! 每个支持的动作一个处理器；处理器收到的是已通过凭证校验的身份、
//! 原始请求体、持久化网关和广播能力，负责写出自己的应答帧。
//! 存储失败统一在这里兜底成内部错误帧，细节只进服务端日志。

mod add_person_to_room;
mod create_room;
mod get_messages;
mod get_rooms;
mod read_room;
mod send_message;

use std::collections::HashSet;

use domain::UserId;
use serde_json::Value;

use crate::broadcast::{send_json, Broadcaster, FrameSink};
use crate::protocol::{Action, ErrorFrame};
use crate::store::{StoreError, StoreGateway};

/// 一次动作调用的上下文。
pub struct ActionContext<'a> {
    /// 已解析的身份。
    pub user: &'a UserId,
    /// 原始请求体，用于动作字段解析与错误回显。
    pub raw: &'a Value,
    pub sink: &'a dyn FrameSink,
    pub gateway: &'a dyn StoreGateway,
    pub broadcaster: &'a dyn Broadcaster,
}

/// 分发到对应的处理器；处理器的存储错误在这里变成内部错误帧。
pub async fn dispatch(action: Action, ctx: ActionContext<'_>) {
    let result = match action {
        Action::GetRooms => get_rooms::run(&ctx).await,
        Action::GetMessages => get_messages::run(&ctx).await,
        Action::SendMessage => send_message::run(&ctx).await,
        Action::CreateRoom => create_room::run(&ctx).await,
        Action::AddPersonToRoom => add_person_to_room::run(&ctx).await,
        Action::ReadRoom => read_room::run(&ctx).await,
    };

    if let Err(err) = result {
        tracing::error!(
            action = action.name(),
            user = %ctx.user,
            error = %err,
            fatal = err.is_fatal(),
            "action handler failed"
        );
        send_json(ctx.sink, &ErrorFrame::internal_server_error(action, ctx.raw));
    }
}

type ActionResult = Result<(), StoreError>;

/// `requested` 里没有出现在 `resolved` 中的名字，保序去重。
fn left_out(requested: &[String], resolved: &[UserId]) -> Vec<String> {
    let resolved: HashSet<&str> = resolved.iter().map(UserId::as_str).collect();
    let mut seen = HashSet::new();
    requested
        .iter()
        .filter(|name| !resolved.contains(name.as_str()))
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

/// 客户端传来的用户名列表：接受字符串或数字，其余值忽略。
fn names_from_array(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|value| match value {
            Value::String(name) => Some(name.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .collect()
}

/// 把原始名字解析成合法的 `UserId`；解析不过的名字留给 invalidUsers 报告。
fn parseable_users(names: &[String]) -> Vec<UserId> {
    names
        .iter()
        .filter_map(|name| UserId::parse(name.as_str()).ok())
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserId {
        UserId::parse(name).unwrap()
    }

    #[test]
    fn left_out_is_an_ordered_set_difference() {
        let requested = vec![
            "a".to_owned(),
            "ghost".to_owned(),
            "b".to_owned(),
            "ghost".to_owned(),
        ];
        let resolved = vec![user("a"), user("b")];
        assert_eq!(left_out(&requested, &resolved), vec!["ghost".to_owned()]);
    }

    #[test]
    fn names_accept_strings_and_numbers() {
        let values = vec![
            Value::String("alice".to_owned()),
            serde_json::json!(42),
            Value::Null,
            Value::Bool(true),
        ];
        assert_eq!(
            names_from_array(&values),
            vec!["alice".to_owned(), "42".to_owned()]
        );
    }
}
