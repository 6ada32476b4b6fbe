use std::sync::Arc;
use crate::{
    auth::TokenService,
    config::Settings,
    service::ServiceContext,
};

#[derive(Clone)]
pub struct AppState {
    pub service_context: Arc<ServiceContext>,
    pub tokens: Arc<TokenService>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(service_context: Arc<ServiceContext>, settings: Arc<Settings>) -> Self {
        let tokens = Arc::new(TokenService::new(&settings.auth.jwt_secret));
        Self {
            service_context,
            tokens,
            settings,
        }
    }
}
