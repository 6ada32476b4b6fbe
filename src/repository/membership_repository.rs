use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Membership, MembershipStatus},
    error::{AppError, Result},
    repository::{parse_uuid, MembershipRepository},
};

pub(crate) const MEMBERSHIP_COLUMNS: &str =
    "id, account_id, club_id, join_date, status, created_at, updated_at";

#[derive(FromRow)]
pub(crate) struct MembershipRow {
    id: String,
    account_id: String,
    club_id: String,
    join_date: Option<NaiveDate>,
    status: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl MembershipRow {
    pub(crate) fn into_membership(self) -> Result<Membership> {
        Ok(Membership {
            id: parse_uuid(&self.id)?,
            account_id: parse_uuid(&self.account_id)?,
            club_id: parse_uuid(&self.club_id)?,
            join_date: self.join_date,
            status: MembershipStatus::from_str(&self.status).ok_or_else(|| {
                AppError::Database(format!("Invalid membership status: {}", self.status))
            })?,
            created_at: DateTime::from_naive_utc_and_offset(self.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(self.updated_at, Utc),
        })
    }
}

pub struct SqliteMembershipRepository {
    pool: SqlitePool,
}

impl SqliteMembershipRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRepository for SqliteMembershipRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>(&format!(
            "SELECT {} FROM memberships WHERE id = ?",
            MEMBERSHIP_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(MembershipRow::into_membership).transpose()
    }

    async fn find_current(&self, account_id: Uuid, club_id: Uuid) -> Result<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>(&format!(
            "SELECT {} FROM memberships WHERE account_id = ? AND club_id = ? AND status != ?",
            MEMBERSHIP_COLUMNS
        ))
        .bind(account_id.to_string())
        .bind(club_id.to_string())
        .bind(MembershipStatus::Removed.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(MembershipRow::into_membership).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: MembershipStatus,
        to: MembershipStatus,
    ) -> Result<Option<Membership>> {
        let result = sqlx::query(
            "UPDATE memberships SET status = ?, updated_at = ? WHERE id = ? AND status = ?"
        )
        .bind(to.as_str())
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }
}
