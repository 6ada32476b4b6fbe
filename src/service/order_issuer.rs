use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    domain::{MembershipStatus, NewPayment, OrderCode, Payment, PaymentStatus},
    error::{AppError, Result},
    payments::{vnpay::VnpayOrder, CheckoutProvider, CheckoutRequest, Gateway, VnpayGateway},
    repository::{ClubDirectory, MembershipRepository, PaymentRepository},
    service::order_code::OrderCodeGenerator,
};

/// Where the hosted checkout sends the payer back. `{order_code}` is
/// substituted per order.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub return_url: String,
    pub cancel_url: String,
}

impl CheckoutUrls {
    fn render(template: &str, order_code: OrderCode) -> String {
        template.replace("{order_code}", &order_code.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutLink {
    pub payment_id: Uuid,
    pub order_code: OrderCode,
    pub gateway: Gateway,
    pub checkout_url: String,
}

/// Turns pending payments into gateway checkouts. Owns no settlement logic:
/// a link only ever leads back to the reconciliation coordinator.
pub struct OrderIssuer {
    payments: Arc<dyn PaymentRepository>,
    memberships: Arc<dyn MembershipRepository>,
    clubs: Arc<dyn ClubDirectory>,
    vnpay: Option<Arc<VnpayGateway>>,
    payos: Option<Arc<dyn CheckoutProvider>>,
    urls: CheckoutUrls,
    codes: OrderCodeGenerator,
}

impl OrderIssuer {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        memberships: Arc<dyn MembershipRepository>,
        clubs: Arc<dyn ClubDirectory>,
        vnpay: Option<Arc<VnpayGateway>>,
        payos: Option<Arc<dyn CheckoutProvider>>,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            payments,
            memberships,
            clubs,
            vnpay,
            payos,
            urls,
            codes: OrderCodeGenerator::new(),
        }
    }

    /// Builds a checkout for the payer's own pending payment.
    ///
    /// The payment keeps its order code across attempts, so a second call
    /// for the same payment reaches the same gateway order.
    pub async fn create_link(
        &self,
        account_id: Uuid,
        payment_id: Uuid,
        gateway: Gateway,
        client_ip: &str,
    ) -> Result<CheckoutLink> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        let membership = self
            .memberships
            .find_by_id(payment.membership_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Membership not found".to_string()))?;

        if membership.account_id != account_id {
            return Err(AppError::Forbidden);
        }

        if payment.status != PaymentStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Payment is already {}",
                payment.status.as_str()
            )));
        }

        let checkout_url = match gateway {
            Gateway::Vnpay => {
                let vnpay = self
                    .vnpay
                    .as_ref()
                    .ok_or_else(|| AppError::BadRequest("VNPay is not configured".to_string()))?;
                vnpay.build_payment_url(&VnpayOrder {
                    order_code: payment.order_code,
                    amount: payment.amount,
                    order_info: payment.description.clone(),
                    client_ip: client_ip.to_string(),
                    created_at: Utc::now(),
                })?
            }
            Gateway::Payos => {
                let payos = self
                    .payos
                    .as_ref()
                    .ok_or_else(|| AppError::BadRequest("payOS is not configured".to_string()))?;
                payos
                    .create_checkout(&CheckoutRequest {
                        order_code: payment.order_code,
                        amount: payment.amount,
                        description: payment.description.clone(),
                        return_url: CheckoutUrls::render(&self.urls.return_url, payment.order_code),
                        cancel_url: CheckoutUrls::render(&self.urls.cancel_url, payment.order_code),
                    })
                    .await?
            }
        };

        self.payments.assign_method(payment.id, gateway.method()).await?;

        tracing::info!(
            "Issued {:?} checkout for order {} (payment {})",
            gateway,
            payment.order_code,
            payment.id
        );

        Ok(CheckoutLink {
            payment_id: payment.id,
            order_code: payment.order_code,
            gateway,
            checkout_url,
        })
    }

    /// Returns the pending payment of a `pending_payment` membership,
    /// creating one with a fresh order code when the previous attempt failed.
    pub async fn open_payment(&self, account_id: Uuid, membership_id: Uuid) -> Result<Payment> {
        let membership = self
            .memberships
            .find_by_id(membership_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Membership not found".to_string()))?;

        if membership.account_id != account_id {
            return Err(AppError::Forbidden);
        }

        if membership.status != MembershipStatus::PendingPayment {
            return Err(AppError::InvalidState(format!(
                "Membership is {}, nothing to pay",
                membership.status.as_str()
            )));
        }

        if let Some(pending) = self.payments.find_pending_for_membership(membership.id).await? {
            return Ok(pending);
        }

        let club = self
            .clubs
            .get_club(membership.club_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Club not found".to_string()))?;

        let created = self
            .codes
            .with_fresh_code(|order_code| {
                self.payments.create(NewPayment {
                    membership_id: membership.id,
                    club_id: club.id,
                    amount: club.membership_fee,
                    order_code,
                    description: fee_description(&club.name),
                })
            })
            .await;

        match created {
            Ok(payment) => {
                tracing::info!("Opened payment {} for membership {}", payment.order_code, membership.id);
                Ok(payment)
            }
            // A concurrent call opened one first.
            Err(AppError::Conflict(_)) => self
                .payments
                .find_pending_for_membership(membership.id)
                .await?
                .ok_or_else(|| AppError::InvalidState("Payment was settled concurrently".to_string())),
            Err(e) => Err(e),
        }
    }

    /// Payment history, visible to the member and to the club's leaders.
    pub async fn payments_for_membership(&self, account_id: Uuid, membership_id: Uuid) -> Result<Vec<Payment>> {
        let membership = self
            .memberships
            .find_by_id(membership_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Membership not found".to_string()))?;

        if membership.account_id != account_id
            && !self.clubs.is_leader_of_club(membership.club_id, account_id).await?
        {
            return Err(AppError::Forbidden);
        }

        self.payments.find_by_membership(membership.id).await
    }
}

pub(crate) fn fee_description(club_name: &str) -> String {
    format!("Membership fee - {}", club_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_templates_receive_order_code() {
        let code = OrderCode::new(17_289_900_000_0042).unwrap();
        assert_eq!(
            CheckoutUrls::render("http://localhost:8080/payments/payos/return?ref={order_code}", code),
            "http://localhost:8080/payments/payos/return?ref=172899000000042"
        );
        assert_eq!(CheckoutUrls::render("http://x/return", code), "http://x/return");
    }

    #[test]
    fn description_names_the_club() {
        assert_eq!(fee_description("Guitar"), "Membership fee - Guitar");
    }
}
