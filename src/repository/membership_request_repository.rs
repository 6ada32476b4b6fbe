use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{MembershipRequest, NewMembershipRequest, RequestStatus},
    error::{AppError, Result},
    repository::{is_unique_violation, parse_uuid, MembershipRequestRepository},
};

pub(crate) const REQUEST_COLUMNS: &str = r#"
    id, account_id, club_id, request_date, status,
    reason, note, processed_by, processed_at
"#;

#[derive(FromRow)]
pub(crate) struct MembershipRequestRow {
    id: String,
    account_id: String,
    club_id: String,
    request_date: NaiveDateTime,
    status: String,
    reason: Option<String>,
    note: Option<String>,
    processed_by: Option<String>,
    processed_at: Option<NaiveDateTime>,
}

impl MembershipRequestRow {
    pub(crate) fn into_request(self) -> Result<MembershipRequest> {
        Ok(MembershipRequest {
            id: parse_uuid(&self.id)?,
            account_id: parse_uuid(&self.account_id)?,
            club_id: parse_uuid(&self.club_id)?,
            request_date: DateTime::from_naive_utc_and_offset(self.request_date, Utc),
            status: RequestStatus::from_str(&self.status).ok_or_else(|| {
                AppError::Database(format!("Invalid request status: {}", self.status))
            })?,
            reason: self.reason,
            note: self.note,
            processed_by: self.processed_by.as_deref().map(parse_uuid).transpose()?,
            processed_at: self.processed_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
        })
    }
}

pub struct SqliteMembershipRequestRepository {
    pool: SqlitePool,
}

impl SqliteMembershipRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRequestRepository for SqliteMembershipRequestRepository {
    async fn create(&self, request: NewMembershipRequest) -> Result<MembershipRequest> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO membership_requests (
                id, account_id, club_id, request_date, status, reason,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(request.account_id.to_string())
        .bind(request.club_id.to_string())
        .bind(now)
        .bind(RequestStatus::Pending.as_str())
        .bind(&request.reason)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("A pending request for this club already exists".to_string())
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created membership request".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<MembershipRequest>> {
        let row = sqlx::query_as::<_, MembershipRequestRow>(&format!(
            "SELECT {} FROM membership_requests WHERE id = ?",
            REQUEST_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(MembershipRequestRow::into_request).transpose()
    }

    async fn find_pending(&self, account_id: Uuid, club_id: Uuid) -> Result<Option<MembershipRequest>> {
        let row = sqlx::query_as::<_, MembershipRequestRow>(&format!(
            "SELECT {} FROM membership_requests WHERE account_id = ? AND club_id = ? AND status = ?",
            REQUEST_COLUMNS
        ))
        .bind(account_id.to_string())
        .bind(club_id.to_string())
        .bind(RequestStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(MembershipRequestRow::into_request).transpose()
    }

    async fn list_by_club(
        &self,
        club_id: Uuid,
        status: Option<RequestStatus>,
    ) -> Result<Vec<MembershipRequest>> {
        let rows = sqlx::query_as::<_, MembershipRequestRow>(&format!(
            r#"
            SELECT {} FROM membership_requests
            WHERE club_id = ? AND (? IS NULL OR status = ?)
            ORDER BY request_date ASC
            "#,
            REQUEST_COLUMNS
        ))
        .bind(club_id.to_string())
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(MembershipRequestRow::into_request)
            .collect()
    }

    async fn reject(
        &self,
        id: Uuid,
        processed_by: Uuid,
        note: &str,
    ) -> Result<Option<MembershipRequest>> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE membership_requests
            SET status = ?, note = ?, processed_by = ?, processed_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#
        )
        .bind(RequestStatus::Rejected.as_str())
        .bind(note)
        .bind(processed_by.to_string())
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .bind(RequestStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }
}
