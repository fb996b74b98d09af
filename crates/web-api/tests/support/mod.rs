use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::MemoryStore;
use tokio::net::TcpListener;
use tokio::time::sleep;
use web_api::{router, AppState, JwtConfig, JwtService};

/// 用内存存储起一个完整的服务端，返回监听地址。
pub async fn spawn_server() -> SocketAddr {
    let store = MemoryStore::default();
    let jwt_service = Arc::new(JwtService::new(JwtConfig {
        secret: "integration-test-secret-key-32-chars".to_string(),
        expiration_hours: 24,
    }));
    // 测试里用最低的 bcrypt 代价，避免拖慢用例
    let state = AppState::new(Arc::new(store), jwt_service, Some(4));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .ok();
    });

    // allow server to start
    sleep(Duration::from_millis(50)).await;
    addr
}
