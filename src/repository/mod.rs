use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;
use crate::domain::*;
use crate::error::{AppError, Result};

pub mod club_repository;
pub mod lifecycle_repository;
pub mod membership_repository;
pub mod membership_request_repository;
pub mod payment_repository;

pub use club_repository::SqliteClubDirectory;
pub use lifecycle_repository::SqliteLifecycleStore;
pub use membership_repository::SqliteMembershipRepository;
pub use membership_request_repository::SqliteMembershipRequestRepository;
pub use payment_repository::SqlitePaymentRepository;

/// Opens a file-backed pool. WAL lets readers run beside the single writer,
/// and writers wait up to `busy_timeout` for the lock.
pub async fn connect_pool(url: &str, max_connections: u32) -> std::result::Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Club data owned by the club administration service.
#[async_trait]
pub trait ClubDirectory: Send + Sync {
    async fn get_club(&self, club_id: Uuid) -> Result<Option<Club>>;
    async fn is_leader_of_club(&self, club_id: Uuid, account_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait MembershipRequestRepository: Send + Sync {
    async fn create(&self, request: NewMembershipRequest) -> Result<MembershipRequest>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<MembershipRequest>>;
    async fn find_pending(&self, account_id: Uuid, club_id: Uuid) -> Result<Option<MembershipRequest>>;
    async fn list_by_club(
        &self,
        club_id: Uuid,
        status: Option<RequestStatus>,
    ) -> Result<Vec<MembershipRequest>>;
    /// Moves a pending request to `rejected`. Returns `None` when the request
    /// was not pending at the time of the update.
    async fn reject(
        &self,
        id: Uuid,
        processed_by: Uuid,
        note: &str,
    ) -> Result<Option<MembershipRequest>>;
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Membership>>;
    /// The non-removed membership for the pair, if any.
    async fn find_current(&self, account_id: Uuid, club_id: Uuid) -> Result<Option<Membership>>;
    /// Conditional status change used by leader moderation. Returns `None`
    /// when the membership was not in `from` at the time of the update.
    async fn transition(
        &self,
        id: Uuid,
        from: MembershipStatus,
        to: MembershipStatus,
    ) -> Result<Option<Membership>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Inserts a `pending` payment. Fails with `DuplicateOrderCode` on an
    /// order-code collision and `Conflict` when the membership already has a
    /// pending payment.
    async fn create(&self, payment: NewPayment) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_order_code(&self, order_code: OrderCode) -> Result<Option<Payment>>;
    async fn find_by_membership(&self, membership_id: Uuid) -> Result<Vec<Payment>>;
    async fn find_pending_for_membership(&self, membership_id: Uuid) -> Result<Option<Payment>>;
    /// Records which gateway a pending payment was sent to.
    async fn assign_method(&self, id: Uuid, method: PaymentMethod) -> Result<()>;
}

/// Input of the approval bundle: request -> approved_pending_payment plus a
/// new membership and payment, committed together.
#[derive(Debug, Clone)]
pub struct ApprovalBundle {
    pub request_id: Uuid,
    pub leader_id: Uuid,
    pub note: Option<String>,
    pub order_code: OrderCode,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct Approval {
    pub request: MembershipRequest,
    pub membership: Membership,
    pub payment: Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Paid { method: PaymentMethod },
    Failed { method: Option<PaymentMethod> },
}

#[derive(Debug, Clone)]
pub enum SettlementResult {
    /// This call moved the payment out of `pending`.
    Applied(Payment),
    /// The payment was already terminal; nothing was written.
    AlreadyTerminal(Payment),
}

impl SettlementResult {
    pub fn payment(&self) -> &Payment {
        match self {
            SettlementResult::Applied(p) | SettlementResult::AlreadyTerminal(p) => p,
        }
    }
}

/// Multi-row transitions that must commit as one unit.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn apply_approval(&self, bundle: ApprovalBundle) -> Result<Approval>;
    /// Settles a pending payment. The pending -> terminal step is a single
    /// conditional update, so concurrent callers cannot both apply it.
    async fn apply_settlement(&self, payment_id: Uuid, settlement: Settlement) -> Result<SettlementResult>;
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn violates_index(err: &sqlx::Error, column: &str) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation() && db.message().contains(column))
}
