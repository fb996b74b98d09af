//! 基础设施层。
//!
//! 连接注册表与帧分发器（核心）、以及持久化网关的 Postgres 实现。

pub mod db;
pub mod dispatcher;
pub mod registry;

pub use db::{create_pg_pool, PgStore};
pub use dispatcher::{ConnectionSession, Dispatcher, FrameDisposition};
pub use registry::{ConnectionHandle, ConnectionRegistry, Outbound};
