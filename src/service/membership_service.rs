use std::sync::Arc;

use uuid::Uuid;

use crate::{
    domain::{Membership, MembershipStatus},
    error::{AppError, Result},
    repository::{ClubDirectory, MembershipRepository},
};

/// Leader moderation of existing memberships.
pub struct MembershipService {
    memberships: Arc<dyn MembershipRepository>,
    clubs: Arc<dyn ClubDirectory>,
}

impl MembershipService {
    pub fn new(memberships: Arc<dyn MembershipRepository>, clubs: Arc<dyn ClubDirectory>) -> Self {
        Self { memberships, clubs }
    }

    pub async fn get(&self, account_id: Uuid, membership_id: Uuid) -> Result<Membership> {
        let membership = self.load(membership_id).await?;

        if membership.account_id != account_id
            && !self.clubs.is_leader_of_club(membership.club_id, account_id).await?
        {
            return Err(AppError::Forbidden);
        }

        Ok(membership)
    }

    pub async fn lock(&self, leader_id: Uuid, membership_id: Uuid) -> Result<Membership> {
        self.moderate(leader_id, membership_id, &[MembershipStatus::Active], MembershipStatus::Locked)
            .await
    }

    pub async fn unlock(&self, leader_id: Uuid, membership_id: Uuid) -> Result<Membership> {
        self.moderate(leader_id, membership_id, &[MembershipStatus::Locked], MembershipStatus::Active)
            .await
    }

    /// Removal frees the pair for a new request.
    pub async fn remove(&self, leader_id: Uuid, membership_id: Uuid) -> Result<Membership> {
        self.moderate(
            leader_id,
            membership_id,
            &[MembershipStatus::Active, MembershipStatus::Locked],
            MembershipStatus::Removed,
        )
        .await
    }

    async fn moderate(
        &self,
        leader_id: Uuid,
        membership_id: Uuid,
        allowed_from: &[MembershipStatus],
        to: MembershipStatus,
    ) -> Result<Membership> {
        let membership = self.load(membership_id).await?;

        if !self.clubs.is_leader_of_club(membership.club_id, leader_id).await? {
            return Err(AppError::Forbidden);
        }

        for from in allowed_from {
            if let Some(updated) = self.memberships.transition(membership_id, *from, to).await? {
                tracing::info!(
                    "Leader {} moved membership {} from {} to {}",
                    leader_id,
                    membership_id,
                    from.as_str(),
                    to.as_str()
                );
                return Ok(updated);
            }
        }

        Err(AppError::InvalidState(format!(
            "Membership is {}, cannot become {}",
            membership.status.as_str(),
            to.as_str()
        )))
    }

    async fn load(&self, membership_id: Uuid) -> Result<Membership> {
        self.memberships
            .find_by_id(membership_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Membership not found".to_string()))
    }
}
