use std::sync::Arc;

use uuid::Uuid;

use crate::{
    domain::{PaymentMethod, PaymentStatus},
    error::{AppError, Result},
    repository::{LifecycleStore, Settlement, SettlementResult},
};

/// Guards the payment status machine: `pending -> paid` and
/// `pending -> failed`, nothing else. Repeating the status a payment already
/// holds is a no-op; asking for the opposite terminal status is refused.
///
/// Only the reconciliation coordinator drives this type.
pub(crate) struct PaymentStateMachine {
    lifecycle: Arc<dyn LifecycleStore>,
}

impl PaymentStateMachine {
    pub(crate) fn new(lifecycle: Arc<dyn LifecycleStore>) -> Self {
        Self { lifecycle }
    }

    /// Settles the payment as paid and activates its membership in the same
    /// unit of work.
    pub(crate) async fn mark_paid(&self, payment_id: Uuid, method: PaymentMethod) -> Result<SettlementResult> {
        let result = self
            .lifecycle
            .apply_settlement(payment_id, Settlement::Paid { method })
            .await?;

        match &result {
            SettlementResult::AlreadyTerminal(p) if p.status == PaymentStatus::Failed => {
                Err(AppError::AlreadySettled(format!("Payment {} already failed", p.id)))
            }
            _ => Ok(result),
        }
    }

    pub(crate) async fn mark_failed(
        &self,
        payment_id: Uuid,
        method: Option<PaymentMethod>,
    ) -> Result<SettlementResult> {
        let result = self
            .lifecycle
            .apply_settlement(payment_id, Settlement::Failed { method })
            .await?;

        match &result {
            SettlementResult::AlreadyTerminal(p) if p.status == PaymentStatus::Paid => {
                Err(AppError::AlreadySettled(format!("Payment {} already paid", p.id)))
            }
            _ => Ok(result),
        }
    }
}
