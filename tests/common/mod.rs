//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::{Sha256, Sha512};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::sync::Mutex;
use uuid::Uuid;

pub use clubhouse::{
    config::{Settings, VnpayConfig},
    domain::*,
    error::{AppError, Result},
    payments::{
        payos::signature_payload, vnpay::canonical_query, CheckoutProvider, CheckoutRequest,
        Gateway, GatewaySignal, PayosVerifier, ProviderStatus, VnpayGateway,
    },
    repository::{MembershipRepository, MembershipRequestRepository, PaymentRepository, SqliteClubDirectory},
    repository::connect_pool,
    service::{Channel, CheckoutUrls, GatewayClients, ServiceContext},
};

pub const VNPAY_SECRET: &str = "TESTSECRETKEY0123456789ABCDEFGHI";
pub const PAYOS_CHECKSUM_KEY: &str = "PAYOSCHECKSUMKEY0123456789abcdef";
pub const CLUB_FEE: i64 = 100_000;

/// Stands in for the hosted-checkout gateway: remembers create calls and
/// answers status polls with whatever the test sets.
pub struct FakeCheckout {
    pub created: Mutex<Vec<CheckoutRequest>>,
    pub status: Mutex<ProviderStatus>,
}

impl FakeCheckout {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            status: Mutex::new(ProviderStatus::Pending),
        }
    }

    pub async fn set_status(&self, status: ProviderStatus) {
        *self.status.lock().await = status;
    }
}

#[async_trait]
impl CheckoutProvider for FakeCheckout {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<String> {
        self.created.lock().await.push(request.clone());
        Ok(format!("https://pay.example.test/web/{}", request.order_code))
    }

    async fn fetch_status(&self, _order_code: OrderCode) -> Result<ProviderStatus> {
        Ok(*self.status.lock().await)
    }
}

pub struct TestEnv {
    pub pool: SqlitePool,
    pub ctx: Arc<ServiceContext>,
    pub checkout: Arc<FakeCheckout>,
    pub club: Club,
    pub leader_id: Uuid,
    pub student_id: Uuid,
    /// Holds the database file of a shared pool until the test ends.
    pub db_dir: Option<TempDir>,
}

/// One connection, kept for the whole test, so the in-memory database
/// survives between queries.
pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub fn vnpay_config() -> VnpayConfig {
    VnpayConfig {
        enabled: true,
        tmn_code: Some("TESTTMN1".to_string()),
        hash_secret: Some(VNPAY_SECRET.to_string()),
        return_url: Some("http://localhost:8080/payments/vnpay/return".to_string()),
        ..VnpayConfig::default()
    }
}

/// File-backed pool with several connections, so concurrent calls really
/// contend for the database.
pub async fn setup_shared_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("clubhouse.db").display());
    let pool = connect_pool(&url, 8).await.expect("Failed to open database file");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    (dir, pool)
}

pub async fn setup() -> TestEnv {
    setup_with(setup_pool().await, None).await
}

pub async fn setup_shared() -> TestEnv {
    let (dir, pool) = setup_shared_pool().await;
    setup_with(pool, Some(dir)).await
}

async fn setup_with(pool: SqlitePool, db_dir: Option<TempDir>) -> TestEnv {

    let club = Club {
        id: Uuid::new_v4(),
        name: "Guitar".to_string(),
        membership_fee: CLUB_FEE,
    };
    let leader_id = Uuid::new_v4();

    let directory = SqliteClubDirectory::new(pool.clone());
    directory.upsert(&club).await.expect("Failed to seed club");
    directory
        .add_leader(club.id, leader_id)
        .await
        .expect("Failed to seed leader");

    let checkout = Arc::new(FakeCheckout::new());
    let gateways = GatewayClients {
        vnpay: VnpayGateway::new(&vnpay_config()).map(Arc::new),
        payos: Some(checkout.clone() as Arc<dyn CheckoutProvider>),
        payos_verifier: Some(PayosVerifier::new(PAYOS_CHECKSUM_KEY)),
    };
    let urls = CheckoutUrls {
        return_url: "http://localhost:8080/payments/payos/return".to_string(),
        cancel_url: "http://localhost:8080/payments/payos/return".to_string(),
    };

    let ctx = Arc::new(ServiceContext::new(pool.clone(), gateways, urls).await);

    TestEnv {
        pool,
        ctx,
        checkout,
        club,
        leader_id,
        student_id: Uuid::new_v4(),
        db_dir,
    }
}

impl TestEnv {
    /// Submits and approves a request for the student, returning the
    /// pending payment.
    pub async fn approved_payment(&self) -> Payment {
        let request = self
            .ctx
            .request_service
            .submit(self.student_id, self.club.id, Some("I play bass".to_string()))
            .await
            .expect("submit failed");

        self.ctx
            .request_service
            .approve(self.leader_id, request.id, None)
            .await
            .expect("approve failed")
            .payment
    }

    pub async fn payment(&self, id: Uuid) -> Payment {
        self.ctx
            .payment_repo
            .find_by_id(id)
            .await
            .expect("payment lookup failed")
            .expect("payment missing")
    }

    pub async fn membership(&self, id: Uuid) -> Membership {
        self.ctx
            .membership_repo
            .find_by_id(id)
            .await
            .expect("membership lookup failed")
            .expect("membership missing")
    }
}

pub fn signal(gateway: Gateway, order_code: OrderCode, success: bool, amount: Option<i64>) -> GatewaySignal {
    GatewaySignal {
        gateway,
        order_code,
        success,
        result_code: if success { "00" } else { "24" }.to_string(),
        amount,
    }
}

/// Redirect-gateway callback parameters, signed the way the gateway signs them.
pub fn signed_vnpay_params(order_code: OrderCode, amount: i64, response_code: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("vnp_Amount".to_string(), (amount * 100).to_string());
    params.insert("vnp_BankCode".to_string(), "NCB".to_string());
    params.insert("vnp_OrderInfo".to_string(), "Membership fee - Guitar".to_string());
    params.insert("vnp_PayDate".to_string(), "20241015103000".to_string());
    params.insert("vnp_ResponseCode".to_string(), response_code.to_string());
    params.insert("vnp_TmnCode".to_string(), "TESTTMN1".to_string());
    params.insert("vnp_TransactionNo".to_string(), "14226112".to_string());
    params.insert("vnp_TransactionStatus".to_string(), response_code.to_string());
    params.insert("vnp_TxnRef".to_string(), order_code.to_string());

    sign_vnpay_params(&mut params);
    params
}

/// Replaces `vnp_SecureHash` with a signature over the current parameters.
pub fn sign_vnpay_params(params: &mut BTreeMap<String, String>) {
    params.remove("vnp_SecureHash");
    let query = canonical_query(params).expect("canonical query");
    let mut mac = Hmac::<Sha512>::new_from_slice(VNPAY_SECRET.as_bytes()).expect("hmac key");
    mac.update(query.as_bytes());
    params.insert("vnp_SecureHash".to_string(), hex::encode(mac.finalize().into_bytes()));
}

pub fn query_string(params: &BTreeMap<String, String>) -> String {
    serde_urlencoded::to_string(params).expect("query encoding")
}

/// Webhook envelope for the checkout gateway, signed with the test key.
pub fn signed_payos_webhook(order_code: OrderCode, amount: i64, code: &str) -> Value {
    let mut data = Map::new();
    data.insert("orderCode".to_string(), Value::from(order_code.get()));
    data.insert("amount".to_string(), Value::from(amount));
    data.insert("description".to_string(), Value::from("Membership fee"));
    data.insert("accountNumber".to_string(), Value::from("12345678"));
    data.insert("reference".to_string(), Value::from("FT24289000001"));
    data.insert("transactionDateTime".to_string(), Value::from("2024-10-15 10:30:00"));
    data.insert("currency".to_string(), Value::from("VND"));
    data.insert("paymentLinkId".to_string(), Value::from("a1b2c3d4"));
    data.insert("code".to_string(), Value::from(code));
    data.insert("desc".to_string(), Value::from("success"));
    data.insert("counterAccountName".to_string(), Value::Null);

    let mut mac = Hmac::<Sha256>::new_from_slice(PAYOS_CHECKSUM_KEY.as_bytes()).expect("hmac key");
    mac.update(signature_payload(&data).as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    serde_json::json!({
        "code": "00",
        "desc": "success",
        "success": code == "00",
        "data": Value::Object(data),
        "signature": signature,
    })
}
