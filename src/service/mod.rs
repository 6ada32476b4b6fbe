pub mod membership_request_service;
pub mod membership_service;
pub mod order_code;
pub mod order_issuer;
pub(crate) mod payment_state;
pub mod reconciliation;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Settings;
use crate::integrations::{inbox::InboxIntegration, IntegrationManager};
use crate::payments::{CheckoutProvider, PayosClient, PayosVerifier, VnpayGateway};
use crate::repository::*;
use membership_request_service::MembershipRequestService;
use membership_service::MembershipService;
use order_issuer::OrderIssuer;
use reconciliation::ReconciliationCoordinator;

pub use order_issuer::{CheckoutLink, CheckoutUrls};
pub use reconciliation::{Channel, Reconciliation};

/// Gateway adapters available to this process. A gateway left `None` is
/// disabled: links for it are refused and its callbacks are rejected.
#[derive(Clone, Default)]
pub struct GatewayClients {
    pub vnpay: Option<Arc<VnpayGateway>>,
    pub payos: Option<Arc<dyn CheckoutProvider>>,
    pub payos_verifier: Option<PayosVerifier>,
}

impl GatewayClients {
    pub fn from_settings(settings: &Settings) -> Self {
        let vnpay = VnpayGateway::new(&settings.vnpay).map(Arc::new);
        let payos = PayosClient::new(&settings.payos);
        let payos_verifier = payos.as_ref().map(|client| client.verifier().clone());

        Self {
            vnpay,
            payos: payos.map(|client| Arc::new(client) as Arc<dyn CheckoutProvider>),
            payos_verifier,
        }
    }
}

impl CheckoutUrls {
    pub fn from_settings(settings: &Settings) -> Self {
        let base = settings.server.base_url.trim_end_matches('/');
        Self {
            return_url: settings
                .payos
                .return_url
                .clone()
                .unwrap_or_else(|| format!("{}/payments/payos/return", base)),
            cancel_url: settings
                .payos
                .cancel_url
                .clone()
                .unwrap_or_else(|| format!("{}/payments/payos/return", base)),
        }
    }
}

pub struct ServiceContext {
    pub club_directory: Arc<dyn ClubDirectory>,
    pub request_repo: Arc<dyn MembershipRequestRepository>,
    pub membership_repo: Arc<dyn MembershipRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub integration_manager: Arc<IntegrationManager>,
    pub inbox: Arc<InboxIntegration>,
    pub request_service: Arc<MembershipRequestService>,
    pub membership_service: Arc<MembershipService>,
    pub order_issuer: Arc<OrderIssuer>,
    pub coordinator: Arc<ReconciliationCoordinator>,
    pub gateways: GatewayClients,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub async fn new(db_pool: SqlitePool, gateways: GatewayClients, urls: CheckoutUrls) -> Self {
        let club_directory: Arc<dyn ClubDirectory> = Arc::new(SqliteClubDirectory::new(db_pool.clone()));
        let request_repo: Arc<dyn MembershipRequestRepository> =
            Arc::new(SqliteMembershipRequestRepository::new(db_pool.clone()));
        let membership_repo: Arc<dyn MembershipRepository> =
            Arc::new(SqliteMembershipRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let lifecycle: Arc<dyn LifecycleStore> = Arc::new(SqliteLifecycleStore::new(db_pool.clone()));

        let integration_manager = Arc::new(IntegrationManager::new());
        let inbox = Arc::new(InboxIntegration::new());
        integration_manager.register(inbox.clone()).await;

        let request_service = Arc::new(MembershipRequestService::new(
            request_repo.clone(),
            membership_repo.clone(),
            club_directory.clone(),
            lifecycle.clone(),
            integration_manager.clone(),
        ));
        let membership_service = Arc::new(MembershipService::new(
            membership_repo.clone(),
            club_directory.clone(),
        ));
        let order_issuer = Arc::new(OrderIssuer::new(
            payment_repo.clone(),
            membership_repo.clone(),
            club_directory.clone(),
            gateways.vnpay.clone(),
            gateways.payos.clone(),
            urls,
        ));
        let coordinator = Arc::new(ReconciliationCoordinator::new(
            payment_repo.clone(),
            membership_repo.clone(),
            club_directory.clone(),
            lifecycle,
            integration_manager.clone(),
        ));

        Self {
            club_directory,
            request_repo,
            membership_repo,
            payment_repo,
            integration_manager,
            inbox,
            request_service,
            membership_service,
            order_issuer,
            coordinator,
            gateways,
            db_pool,
        }
    }
}
