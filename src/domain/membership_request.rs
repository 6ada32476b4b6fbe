use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipRequest {
    pub id: Uuid,
    pub account_id: Uuid,
    pub club_id: Uuid,
    pub request_date: DateTime<Utc>,
    pub status: RequestStatus,
    pub reason: Option<String>,
    pub note: Option<String>,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// `pending -> {approved_pending_payment, rejected}`, `approved_pending_payment -> completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    ApprovedPendingPayment,
    Rejected,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::ApprovedPendingPayment => "approved_pending_payment",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "approved_pending_payment" => Some(RequestStatus::ApprovedPendingPayment),
            "rejected" => Some(RequestStatus::Rejected),
            "completed" => Some(RequestStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Rejected | RequestStatus::Completed)
    }
}

#[derive(Debug, Clone)]
pub struct NewMembershipRequest {
    pub account_id: Uuid,
    pub club_id: Uuid,
    pub reason: Option<String>,
}

pub const DEFAULT_REJECTION_NOTE: &str = "Your request was declined by the club leader.";
