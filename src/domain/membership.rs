use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub account_id: Uuid,
    pub club_id: Uuid,
    /// Set when the fee is settled; `None` while `pending_payment`.
    pub join_date: Option<NaiveDate>,
    pub status: MembershipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    PendingPayment,
    Active,
    Locked,
    Removed,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::PendingPayment => "pending_payment",
            MembershipStatus::Active => "active",
            MembershipStatus::Locked => "locked",
            MembershipStatus::Removed => "removed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending_payment" => Some(MembershipStatus::PendingPayment),
            "active" => Some(MembershipStatus::Active),
            "locked" => Some(MembershipStatus::Locked),
            "removed" => Some(MembershipStatus::Removed),
            _ => None,
        }
    }
}
