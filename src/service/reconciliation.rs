use std::{fmt, sync::Arc};

use serde::Serialize;
use uuid::Uuid;

use crate::{
    domain::{Payment, PaymentMethod, PaymentStatus},
    error::{AppError, Result},
    integrations::{IntegrationManager, LifecycleEvent},
    payments::GatewaySignal,
    repository::{ClubDirectory, LifecycleStore, MembershipRepository, PaymentRepository, SettlementResult},
    service::payment_state::PaymentStateMachine,
};

/// Where a settlement signal came from. Every channel ends up in
/// [`ReconciliationCoordinator`]; none of them settles a payment itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Signed browser redirect (VNPay return URL).
    ReturnRedirect,
    /// Server-to-server webhook (payOS).
    Webhook,
    /// Server-to-server instant payment notification (VNPay IPN).
    Ipn,
    /// Result fetched from the provider's status API after an unsigned return.
    StatusPoll,
    /// Cash or other settlement confirmed by a club leader.
    Manual,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::ReturnRedirect => "return_redirect",
            Channel::Webhook => "webhook",
            Channel::Ipn => "ipn",
            Channel::StatusPoll => "status_poll",
            Channel::Manual => "manual",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub payment: Payment,
    /// `false` when the payment was already terminal and nothing changed.
    pub applied: bool,
}

impl Reconciliation {
    pub fn is_paid(&self) -> bool {
        self.payment.status == PaymentStatus::Paid
    }
}

/// The single entry point that settles payments.
///
/// Redirects, webhooks, IPNs and status polls can all report the same
/// payment, in any order and any number of times. The first terminal
/// outcome to commit wins; later signals are logged and acknowledged
/// without writing anything.
pub struct ReconciliationCoordinator {
    payments: Arc<dyn PaymentRepository>,
    memberships: Arc<dyn MembershipRepository>,
    clubs: Arc<dyn ClubDirectory>,
    state_machine: PaymentStateMachine,
    integration_manager: Arc<IntegrationManager>,
}

impl ReconciliationCoordinator {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        memberships: Arc<dyn MembershipRepository>,
        clubs: Arc<dyn ClubDirectory>,
        lifecycle: Arc<dyn LifecycleStore>,
        integration_manager: Arc<IntegrationManager>,
    ) -> Self {
        Self {
            payments,
            memberships,
            clubs,
            state_machine: PaymentStateMachine::new(lifecycle),
            integration_manager,
        }
    }

    pub async fn reconcile(&self, signal: &GatewaySignal, channel: Channel) -> Result<Reconciliation> {
        let payment = self
            .payments
            .find_by_order_code(signal.order_code)
            .await?
            .ok_or_else(|| {
                tracing::warn!("{} signal for unknown order {}", channel, signal.order_code);
                AppError::NotFound(format!("No payment for order {}", signal.order_code))
            })?;

        if payment.status.is_terminal() {
            tracing::info!(
                "Duplicate {} signal for order {} ignored; payment already {}",
                channel,
                payment.order_code,
                payment.status.as_str()
            );
            return Ok(Reconciliation {
                payment,
                applied: false,
            });
        }

        // A success must carry the exact amount; both gateways always send one.
        if signal.success && signal.amount != Some(payment.amount) {
            tracing::warn!(
                "{} signal for order {} reports amount {:?}, expected {}",
                channel,
                payment.order_code,
                signal.amount,
                payment.amount
            );
            return Err(AppError::AmountMismatch {
                expected: payment.amount,
                received: signal.amount,
            });
        }

        self.settle(payment, signal.success, Some(signal.gateway.method()), channel)
            .await
    }

    /// Records a payment settled outside the gateways, such as cash handed
    /// to a club leader.
    pub async fn confirm_manual(&self, leader_id: Uuid, payment_id: Uuid) -> Result<Reconciliation> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        if !self.clubs.is_leader_of_club(payment.club_id, leader_id).await? {
            return Err(AppError::Forbidden);
        }

        if payment.status.is_terminal() {
            return Ok(Reconciliation {
                payment,
                applied: false,
            });
        }

        tracing::info!("Leader {} confirming order {} manually", leader_id, payment.order_code);
        self.settle(payment, true, Some(PaymentMethod::Cash), Channel::Manual)
            .await
    }

    async fn settle(
        &self,
        payment: Payment,
        success: bool,
        method: Option<PaymentMethod>,
        channel: Channel,
    ) -> Result<Reconciliation> {
        let outcome = match (success, method) {
            (true, Some(method)) => self.state_machine.mark_paid(payment.id, method).await,
            (true, None) => {
                return Err(AppError::Internal("Paid settlement without a method".to_string()));
            }
            (false, method) => self.state_machine.mark_failed(payment.id, method).await,
        };

        match outcome {
            Ok(SettlementResult::Applied(settled)) => {
                tracing::info!(
                    "Order {} settled as {} via {}",
                    settled.order_code,
                    settled.status.as_str(),
                    channel
                );
                self.publish(&settled).await;
                Ok(Reconciliation {
                    payment: settled,
                    applied: true,
                })
            }
            Ok(SettlementResult::AlreadyTerminal(current)) => {
                tracing::info!(
                    "Order {} was settled concurrently as {}; {} signal ignored",
                    current.order_code,
                    current.status.as_str(),
                    channel
                );
                Ok(Reconciliation {
                    payment: current,
                    applied: false,
                })
            }
            Err(AppError::AlreadySettled(reason)) => {
                tracing::info!("{} signal for order {} ignored: {}", channel, payment.order_code, reason);
                let current = self
                    .payments
                    .find_by_id(payment.id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;
                Ok(Reconciliation {
                    payment: current,
                    applied: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn publish(&self, payment: &Payment) {
        let membership = match self.memberships.find_by_id(payment.membership_id).await {
            Ok(Some(membership)) => membership,
            Ok(None) => {
                tracing::error!("Payment {} references missing membership {}", payment.id, payment.membership_id);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to load membership for event: {:?}", e);
                return;
            }
        };

        let event = match payment.status {
            PaymentStatus::Paid => LifecycleEvent::MembershipActivated {
                membership,
                payment: payment.clone(),
            },
            PaymentStatus::Failed => LifecycleEvent::PaymentFailed {
                account_id: membership.account_id,
                payment: payment.clone(),
            },
            PaymentStatus::Pending => return,
        };

        self.integration_manager.handle_event(event).await;
    }
}
