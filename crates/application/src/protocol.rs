//! 线上协议
//!
//! 入站帧统一为 `{token, action, requestID?, ...}`，出站帧总是携带与请求
//! 对应的 `action` 字段（广播则为 `newMessages`）。字段名沿用既有客户端的
//! 约定（`roomID`、`messageID`、`sendOn` 等），通过 serde rename 固定下来。

use domain::{Message, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 凭证无效时的关闭码，携带格式化的原因。
pub const CLOSE_INVALID_TOKEN: u16 = 1003;

/// 同一身份出现更新的连接时，旧连接的关闭码。
pub const CLOSE_SUPERSEDED: u16 = 4001;

/// 被顶替连接的固定关闭原因。
pub const SUPERSEDED_REASON: &str = "connection superseded by a newer login";

const INVALID_REQUEST: &str = "Invalid_Request";
const INTERNAL_SERVER_ERROR: &str = "Internal_Server_Error";

/// 广播帧的动作名。
pub const NEW_MESSAGES: &str = "newMessages";

pub fn invalid_token_reason(token: &str) -> String {
    format!("Invalid token '{}' provided", token)
}

/// 客户端支持的动作集合。
///
/// 线上仍然接受自由字符串，未知名称走协议错误路径；内部用封闭枚举
/// 保证分发的穷尽匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GetRooms,
    GetMessages,
    SendMessage,
    CreateRoom,
    AddPersonToRoom,
    ReadRoom,
}

impl Action {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "getRooms" => Some(Action::GetRooms),
            "getMessages" => Some(Action::GetMessages),
            "sendMessage" => Some(Action::SendMessage),
            "createRoom" => Some(Action::CreateRoom),
            "addPersonToRoom" => Some(Action::AddPersonToRoom),
            "readRoom" => Some(Action::ReadRoom),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::GetRooms => "getRooms",
            Action::GetMessages => "getMessages",
            Action::SendMessage => "sendMessage",
            Action::CreateRoom => "createRoom",
            Action::AddPersonToRoom => "addPersonToRoom",
            Action::ReadRoom => "readRoom",
        }
    }
}

/// 入站帧的公共信封。动作相关字段由各处理器自行解析。
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub token: Option<String>,
    pub action: Option<String>,
}

/// 把回显请求里的凭证抹掉。
pub fn redact_token(mut request: Value) -> Value {
    if let Some(object) = request.as_object_mut() {
        if object.contains_key("token") {
            object.insert("token".to_owned(), json!("[redacted]"));
        }
    }
    request
}

/// 出站错误帧。
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
}

impl ErrorFrame {
    pub fn binary_data() -> Self {
        Self {
            kind: INVALID_REQUEST,
            message: "Binary data is not accepted".to_owned(),
            action: None,
            request: None,
        }
    }

    pub fn not_json(raw: &str) -> Self {
        Self {
            kind: INVALID_REQUEST,
            message: format!("Data is not in json format: {}", raw),
            action: None,
            request: None,
        }
    }

    pub fn unknown_action(action: &str) -> Self {
        Self {
            kind: INVALID_REQUEST,
            message: "Unknown action".to_owned(),
            action: Some(action.to_owned()),
            request: None,
        }
    }

    /// 请求缺字段或字段非法，连接保持打开。
    pub fn missing_data(action: Action, message: impl Into<String>) -> Self {
        Self {
            kind: INVALID_REQUEST,
            message: message.into(),
            action: Some(action.name().to_owned()),
            request: None,
        }
    }

    /// 业务校验失败，回显请求（凭证已抹除）。
    pub fn invalid_request(action: Action, message: impl Into<String>, request: &Value) -> Self {
        Self {
            kind: INVALID_REQUEST,
            message: message.into(),
            action: Some(action.name().to_owned()),
            request: Some(redact_token(request.clone())),
        }
    }

    /// 内部错误：不向客户端透出底层原因，细节只进服务端日志。
    pub fn internal_server_error(action: Action, request: &Value) -> Self {
        Self {
            kind: INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_owned(),
            action: Some(action.name().to_owned()),
            request: Some(redact_token(request.clone())),
        }
    }
}

/// 消息在线上呈现的形状。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "messageID")]
    pub message_id: i64,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "answerToMessageID")]
    pub answer_to: Option<i64>,
    pub content: String,
    #[serde(rename = "sendOn")]
    pub send_on: Timestamp,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id.into(),
            user_id: message.author.to_string(),
            kind: message.kind.as_str().to_owned(),
            answer_to: message.answer_to.map(Into::into),
            content: message.content.clone(),
            send_on: message.sent_on,
        }
    }
}

/// 房间成员及其已读进度。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMember {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "lastMessageRead")]
    pub last_message_read: i64,
}

/// `getRooms` 里单个房间的概览。
#[derive(Debug, Clone, Serialize)]
pub struct RoomOverview {
    #[serde(rename = "roomID")]
    pub room_id: i64,
    #[serde(rename = "roomType")]
    pub room_type: &'static str,
    #[serde(rename = "roomName")]
    pub room_name: String,
    #[serde(rename = "lastReadMessage")]
    pub last_read_message: i64,
    pub members: Vec<WireMember>,
    #[serde(rename = "lastMessage")]
    pub last_message: WireMessage,
}

#[derive(Debug, Serialize)]
pub struct RoomsResponse {
    pub action: &'static str,
    pub rooms: Vec<RoomOverview>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub action: &'static str,
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageAck {
    pub action: &'static str,
    #[serde(rename = "requestID", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    #[serde(rename = "messageStatus")]
    pub message_status: &'static str,
}

/// `createRoom` / `addPersonToRoom` 的状态字符串。
pub const ROOM_STATUS_OK: &str = "ok";
pub const ROOM_STATUS_PARTIAL: &str = "partially added users";
pub const ROOM_STATUS_INVALID: &str = "invalid";

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub action: &'static str,
    #[serde(rename = "requestID", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    #[serde(rename = "roomID")]
    pub room_id: i64,
    #[serde(rename = "roomStatus")]
    pub room_status: &'static str,
    #[serde(rename = "invalidUsers")]
    pub invalid_users: Vec<String>,
}

/// 房间创建被整体拒绝时的应答。
#[derive(Debug, Serialize)]
pub struct CreateRoomRejected {
    pub action: &'static str,
    #[serde(rename = "requestID", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    #[serde(rename = "roomStatus")]
    pub room_status: &'static str,
    #[serde(rename = "invalidUsers")]
    pub invalid_users: Vec<String>,
    #[serde(rename = "errorMsg")]
    pub error_msg: String,
}

#[derive(Debug, Serialize)]
pub struct AddPersonResponse {
    pub action: &'static str,
    #[serde(rename = "roomID")]
    pub room_id: i64,
    #[serde(rename = "roomStatus")]
    pub room_status: &'static str,
    #[serde(rename = "invalidUsers")]
    pub invalid_users: Vec<String>,
}

/// 广播给房间成员的新消息事件。
#[derive(Debug, Clone, Serialize)]
pub struct NewMessagesEvent {
    pub action: &'static str,
    pub data: Vec<RoomMessages>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomMessages {
    #[serde(rename = "roomID")]
    pub room_id: i64,
    pub messages: Vec<WireMessage>,
}

impl NewMessagesEvent {
    pub fn single(room_id: i64, message: WireMessage) -> Self {
        Self {
            action: NEW_MESSAGES,
            data: vec![RoomMessages {
                room_id,
                messages: vec![message],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_round_trip() {
        for name in [
            "getRooms",
            "getMessages",
            "sendMessage",
            "createRoom",
            "addPersonToRoom",
            "readRoom",
        ] {
            let action = Action::from_name(name).unwrap();
            assert_eq!(action.name(), name);
        }
        assert!(Action::from_name("leaveRoom").is_none());
        assert!(Action::from_name("").is_none());
    }

    #[test]
    fn redaction_replaces_token_only() {
        let request = json!({"token": "secret-jwt", "action": "readRoom", "roomID": 7});
        let redacted = redact_token(request);
        assert_eq!(redacted["token"], "[redacted]");
        assert_eq!(redacted["roomID"], 7);
    }

    #[test]
    fn error_frames_match_wire_shape() {
        let frame = ErrorFrame::unknown_action("danceParty");
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "Invalid_Request");
        assert_eq!(value["message"], "Unknown action");
        assert_eq!(value["action"], "danceParty");
        assert!(value.get("request").is_none());
    }
}
