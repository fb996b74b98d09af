//! HTTP 路由
//!
//! 账号注册与换取 token 的两个端点，加上 WebSocket 升级入口；
//! 其余路径一律 404。

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use application::{StoreGateway, StoreHandle};
use domain::UserId;

use crate::error::ApiError;
use crate::state::AppState;
use crate::websocket::ws_upgrade;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/user/create", post(create_user))
        .route("/user/newToken", post(new_token))
        .route("/ws", get(ws_upgrade))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

#[derive(Debug, Deserialize)]
struct CredentialsBody {
    user: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
}

/// 注册新账号。
async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Result<StatusCode, ApiError> {
    let (Some(user), Some(password)) = (body.user, body.password) else {
        return Err(ApiError::forbidden("user and password must be set"));
    };
    let user = UserId::parse(user.as_str())
        .map_err(|err| ApiError::forbidden(format!("invalid user: {}", err)))?;

    let hash = bcrypt::hash(password.as_str(), state.bcrypt_cost).map_err(|err| {
        tracing::error!(error = %err, "password hashing failed");
        ApiError::internal_server_error("registration failed")
    })?;

    let mut store = state.gateway.acquire().await.map_err(internal)?;
    let created = store.insert_user(&user, &hash).await.map_err(internal)?;
    if !created {
        return Err(ApiError::forbidden("user already exists"));
    }

    tracing::info!(user = %user, "account created");
    Ok(StatusCode::OK)
}

/// 校验口令并签发 JWT。
async fn new_token(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Result<Json<TokenResponse>, ApiError> {
    let (Some(user), Some(password)) = (body.user, body.password) else {
        return Err(ApiError::forbidden("Username or password not correct"));
    };
    let Ok(user) = UserId::parse(user.as_str()) else {
        return Err(ApiError::forbidden("Username or password not correct"));
    };

    let mut store = state.gateway.acquire().await.map_err(internal)?;
    let Some(hash) = store.password_hash(&user).await.map_err(internal)? else {
        return Err(ApiError::forbidden("Username or password not correct"));
    };
    drop(store);

    let valid = bcrypt::verify(password.as_str(), hash.as_str()).map_err(|err| {
        tracing::error!(error = %err, "password verification failed");
        ApiError::internal_server_error("login failed")
    })?;
    if !valid {
        return Err(ApiError::forbidden("Username or password not correct"));
    }

    let token = state.jwt.issue(&user)?;
    Ok(Json(TokenResponse { token }))
}

fn internal(err: application::StoreError) -> ApiError {
    tracing::error!(error = %err, "store failure while serving http request");
    ApiError::internal_server_error("internal error")
}
