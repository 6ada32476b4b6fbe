use std::sync::Arc;

use uuid::Uuid;

use crate::{
    domain::*,
    error::{AppError, Result},
    integrations::{IntegrationManager, LifecycleEvent},
    repository::{
        Approval, ApprovalBundle, ClubDirectory, LifecycleStore, MembershipRepository,
        MembershipRequestRepository,
    },
    service::{order_code::OrderCodeGenerator, order_issuer::fee_description},
};

pub struct MembershipRequestService {
    requests: Arc<dyn MembershipRequestRepository>,
    memberships: Arc<dyn MembershipRepository>,
    clubs: Arc<dyn ClubDirectory>,
    lifecycle: Arc<dyn LifecycleStore>,
    integration_manager: Arc<IntegrationManager>,
    codes: OrderCodeGenerator,
}

impl MembershipRequestService {
    pub fn new(
        requests: Arc<dyn MembershipRequestRepository>,
        memberships: Arc<dyn MembershipRepository>,
        clubs: Arc<dyn ClubDirectory>,
        lifecycle: Arc<dyn LifecycleStore>,
        integration_manager: Arc<IntegrationManager>,
    ) -> Self {
        Self {
            requests,
            memberships,
            clubs,
            lifecycle,
            integration_manager,
            codes: OrderCodeGenerator::new(),
        }
    }

    pub async fn submit(
        &self,
        account_id: Uuid,
        club_id: Uuid,
        reason: Option<String>,
    ) -> Result<MembershipRequest> {
        self.clubs
            .get_club(club_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Club not found".to_string()))?;

        if self.requests.find_pending(account_id, club_id).await?.is_some() {
            return Err(AppError::Conflict(
                "A request for this club is already pending".to_string(),
            ));
        }

        if let Some(existing) = self.memberships.find_current(account_id, club_id).await? {
            return Err(AppError::Conflict(format!(
                "Account already has a {} membership in this club",
                existing.status.as_str()
            )));
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        // The partial unique index still backs the check above under races.
        let request = self
            .requests
            .create(NewMembershipRequest {
                account_id,
                club_id,
                reason,
            })
            .await?;

        tracing::info!("Account {} requested to join club {}", account_id, club_id);

        self.integration_manager
            .handle_event(LifecycleEvent::RequestSubmitted(request.clone()))
            .await;

        Ok(request)
    }

    /// Approves a pending request. The request, the new `pending_payment`
    /// membership and its first payment are written as one unit.
    pub async fn approve(
        &self,
        leader_id: Uuid,
        request_id: Uuid,
        note: Option<String>,
    ) -> Result<Approval> {
        let request = self.load_for_leader(leader_id, request_id).await?;

        if request.status != RequestStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Request is {}, only pending requests can be approved",
                request.status.as_str()
            )));
        }

        let club = self
            .clubs
            .get_club(request.club_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Club not found".to_string()))?;

        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let description = fee_description(&club.name);

        let approval = self
            .codes
            .with_fresh_code(|order_code| {
                self.lifecycle.apply_approval(ApprovalBundle {
                    request_id,
                    leader_id,
                    note: note.clone(),
                    order_code,
                    description: description.clone(),
                })
            })
            .await?;

        tracing::info!(
            "Leader {} approved request {}; order {} opened for {}",
            leader_id,
            request_id,
            approval.payment.order_code,
            approval.payment.amount
        );

        self.integration_manager
            .handle_event(LifecycleEvent::RequestApproved {
                request: approval.request.clone(),
                payment: approval.payment.clone(),
            })
            .await;

        Ok(approval)
    }

    pub async fn reject(
        &self,
        leader_id: Uuid,
        request_id: Uuid,
        note: Option<String>,
    ) -> Result<MembershipRequest> {
        let request = self.load_for_leader(leader_id, request_id).await?;

        if request.status != RequestStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Request is {}, only pending requests can be rejected",
                request.status.as_str()
            )));
        }

        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_NOTE.to_string());

        let rejected = self
            .requests
            .reject(request_id, leader_id, &note)
            .await?
            .ok_or_else(|| AppError::InvalidState("Request was processed concurrently".to_string()))?;

        tracing::info!("Leader {} rejected request {}", leader_id, request_id);

        self.integration_manager
            .handle_event(LifecycleEvent::RequestRejected(rejected.clone()))
            .await;

        Ok(rejected)
    }

    /// Requests for a club, oldest first. Leaders only.
    pub async fn list_requests(
        &self,
        leader_id: Uuid,
        club_id: Uuid,
        status: Option<RequestStatus>,
    ) -> Result<Vec<MembershipRequest>> {
        if !self.clubs.is_leader_of_club(club_id, leader_id).await? {
            return Err(AppError::Forbidden);
        }

        self.requests.list_by_club(club_id, status).await
    }

    async fn load_for_leader(&self, leader_id: Uuid, request_id: Uuid) -> Result<MembershipRequest> {
        let request = self
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Membership request not found".to_string()))?;

        if !self.clubs.is_leader_of_club(request.club_id, leader_id).await? {
            return Err(AppError::Forbidden);
        }

        Ok(request)
    }
}
