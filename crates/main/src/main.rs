//! 主应用程序入口
//!
//! 加载配置、建立数据库连接、跑迁移，然后启动 Axum 服务。

use std::net::SocketAddr;
use std::sync::Arc;

use config::AppConfig;
use infrastructure::{create_pg_pool, PgStore};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate().map_err(|err| {
        tracing::error!(error = %err, "configuration rejected");
        anyhow::anyhow!(err)
    })?;

    tracing::info!(
        database = config.database.url.split('@').next_back().unwrap_or("unknown"),
        "connecting to database"
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    let gateway = Arc::new(PgStore::new(pg_pool));
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let state = AppState::new(gateway, jwt_service, config.server.bcrypt_cost);

    let app = router(state);
    let bind = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;

    tracing::info!("chat server listening on http://{}", bind);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
