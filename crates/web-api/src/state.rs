use std::sync::Arc;

use application::{StoreGateway, TokenVerifier};
use infrastructure::{ConnectionRegistry, Dispatcher};

use crate::auth::JwtService;

/// 默认的 bcrypt 代价因子。
const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// 应用共享状态。
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn StoreGateway>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub jwt: Arc<JwtService>,
    pub bcrypt_cost: u32,
}

impl AppState {
    pub fn new(
        gateway: Arc<dyn StoreGateway>,
        jwt: Arc<JwtService>,
        bcrypt_cost: Option<u32>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            jwt.clone() as Arc<dyn TokenVerifier>,
            gateway.clone(),
            registry.clone(),
        ));
        Self {
            gateway,
            registry,
            dispatcher,
            jwt,
            bcrypt_cost: bcrypt_cost.unwrap_or(DEFAULT_BCRYPT_COST),
        }
    }
}
