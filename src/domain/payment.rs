use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric correlation key shared with the gateways. Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderCode(i64);

impl OrderCode {
    /// Largest value the webhook gateway accepts (2^53 - 1).
    pub const MAX: i64 = 9_007_199_254_740_991;

    pub fn new(value: i64) -> Option<Self> {
        (1..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse::<i64>().ok().and_then(Self::new)
    }
}

impl fmt::Display for OrderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub membership_id: Uuid,
    pub club_id: Uuid,
    /// Minor currency units, fixed when the payment is created.
    pub amount: i64,
    pub method: Option<PaymentMethod>,
    pub status: PaymentStatus,
    pub order_code: OrderCode,
    pub paid_date: Option<DateTime<Utc>>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `pending -> {paid, failed}`; both outcomes are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Vnpay,
    Payos,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Vnpay => "vnpay",
            PaymentMethod::Payos => "payos",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "vnpay" => Some(PaymentMethod::Vnpay),
            "payos" => Some(PaymentMethod::Payos),
            "cash" => Some(PaymentMethod::Cash),
            _ => None,
        }
    }
}

/// A pending obligation about to be written. Payments are only ever created
/// in `pending`.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub membership_id: Uuid,
    pub club_id: Uuid,
    pub amount: i64,
    pub order_code: OrderCode,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_code_rejects_out_of_range_values() {
        assert!(OrderCode::new(0).is_none());
        assert!(OrderCode::new(-5).is_none());
        assert!(OrderCode::new(OrderCode::MAX + 1).is_none());
        assert_eq!(OrderCode::new(OrderCode::MAX).map(OrderCode::get), Some(OrderCode::MAX));
    }

    #[test]
    fn order_code_parses_gateway_references() {
        assert_eq!(OrderCode::parse(" 172000000000042 ").map(OrderCode::get), Some(172000000000042));
        assert!(OrderCode::parse("12ab").is_none());
        assert!(OrderCode::parse("").is_none());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Paid.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert_eq!(PaymentStatus::from_str("paid"), Some(PaymentStatus::Paid));
        assert_eq!(PaymentStatus::from_str("Completed"), None);
    }
}
