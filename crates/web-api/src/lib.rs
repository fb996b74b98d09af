//! Web API 层。
//!
//! 提供 Axum 路由：账号注册/登录的 HTTP 端点，以及承载全部聊天
//! 动作的 WebSocket 升级端点。

mod auth;
mod error;
mod routes;
mod state;
mod websocket;

pub use auth::JwtService;
pub use config::JwtConfig;
pub use routes::router;
pub use state::AppState;
