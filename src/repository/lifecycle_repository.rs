use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::{
    domain::{
        Membership, MembershipStatus, PaymentStatus, RequestStatus,
    },
    error::{AppError, Result},
    repository::{
        is_unique_violation,
        membership_request_repository::{MembershipRequestRow, REQUEST_COLUMNS},
        payment_repository::{map_payment_insert_error, PaymentRow, PAYMENT_COLUMNS},
        Approval, ApprovalBundle, LifecycleStore, Settlement, SettlementResult,
    },
};

pub struct SqliteLifecycleStore {
    pool: SqlitePool,
}

impl SqliteLifecycleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_payment(
        tx: &mut Transaction<'_, Sqlite>,
        payment_id: Uuid,
    ) -> Result<Option<PaymentRow>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id.to_string())
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn load_request(
        tx: &mut Transaction<'_, Sqlite>,
        request_id: Uuid,
    ) -> Result<Option<MembershipRequestRow>> {
        let row = sqlx::query_as::<_, MembershipRequestRow>(&format!(
            "SELECT {} FROM membership_requests WHERE id = ?",
            REQUEST_COLUMNS
        ))
        .bind(request_id.to_string())
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row)
    }
}

#[async_trait]
impl LifecycleStore for SqliteLifecycleStore {
    async fn apply_approval(&self, bundle: ApprovalBundle) -> Result<Approval> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let now_naive = now.naive_utc();

        // Must stay the first statement: it takes the write lock.
        let claimed = sqlx::query(
            r#"
            UPDATE membership_requests
            SET status = ?, note = ?, processed_by = ?, processed_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#
        )
        .bind(RequestStatus::ApprovedPendingPayment.as_str())
        .bind(&bundle.note)
        .bind(bundle.leader_id.to_string())
        .bind(now_naive)
        .bind(now_naive)
        .bind(bundle.request_id.to_string())
        .bind(RequestStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            let current = Self::load_request(&mut tx, bundle.request_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Membership request not found".to_string()))?
                .into_request()?;
            return Err(AppError::InvalidState(format!(
                "Request is {}, only pending requests can be approved",
                current.status.as_str()
            )));
        }

        let request = Self::load_request(&mut tx, bundle.request_id)
            .await?
            .ok_or_else(|| AppError::Database("Approved request vanished".to_string()))?
            .into_request()?;

        // Fee is read inside the unit and frozen into the payment amount.
        let fee = sqlx::query_scalar::<_, i64>("SELECT membership_fee FROM clubs WHERE id = ?")
            .bind(request.club_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Club not found".to_string()))?;

        let membership = Membership {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            club_id: request.club_id,
            join_date: None,
            status: MembershipStatus::PendingPayment,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO memberships (id, account_id, club_id, join_date, status, created_at, updated_at)
            VALUES (?, ?, ?, NULL, ?, ?, ?)
            "#
        )
        .bind(membership.id.to_string())
        .bind(membership.account_id.to_string())
        .bind(membership.club_id.to_string())
        .bind(membership.status.as_str())
        .bind(now_naive)
        .bind(now_naive)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Account already has a membership in this club".to_string())
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        let payment_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, membership_id, club_id, amount, method, status,
                order_code, paid_date, description, created_at, updated_at
            ) VALUES (?, ?, ?, ?, NULL, ?, ?, NULL, ?, ?, ?)
            "#
        )
        .bind(payment_id.to_string())
        .bind(membership.id.to_string())
        .bind(membership.club_id.to_string())
        .bind(fee)
        .bind(PaymentStatus::Pending.as_str())
        .bind(bundle.order_code.get())
        .bind(&bundle.description)
        .bind(now_naive)
        .bind(now_naive)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_payment_insert_error(e, bundle.order_code))?;

        let payment = Self::load_payment(&mut tx, payment_id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created payment".to_string()))?
            .into_payment()?;

        tx.commit().await?;

        Ok(Approval {
            request,
            membership,
            payment,
        })
    }

    async fn apply_settlement(&self, payment_id: Uuid, settlement: Settlement) -> Result<SettlementResult> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let updated = match settlement {
            Settlement::Paid { method } => {
                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = ?, paid_date = ?, method = ?, updated_at = ?
                    WHERE id = ? AND status = ?
                    "#
                )
                .bind(PaymentStatus::Paid.as_str())
                .bind(now.naive_utc())
                .bind(method.as_str())
                .bind(now.naive_utc())
                .bind(payment_id.to_string())
                .bind(PaymentStatus::Pending.as_str())
                .execute(&mut *tx)
                .await?
            }
            Settlement::Failed { method } => {
                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = ?, method = COALESCE(?, method), updated_at = ?
                    WHERE id = ? AND status = ?
                    "#
                )
                .bind(PaymentStatus::Failed.as_str())
                .bind(method.map(|m| m.as_str()))
                .bind(now.naive_utc())
                .bind(payment_id.to_string())
                .bind(PaymentStatus::Pending.as_str())
                .execute(&mut *tx)
                .await?
            }
        };

        let payment = Self::load_payment(&mut tx, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?
            .into_payment()?;

        if updated.rows_affected() == 0 {
            // Lost the race or a redelivery: the payment was already terminal.
            tx.rollback().await?;
            return Ok(SettlementResult::AlreadyTerminal(payment));
        }

        if matches!(settlement, Settlement::Paid { .. }) {
            let membership = sqlx::query_as::<_, (String, String, String)>(
                "SELECT account_id, club_id, status FROM memberships WHERE id = ?"
            )
            .bind(payment.membership_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::Database("Payment references a missing membership".to_string()))?;
            let (account_id, club_id, status) = membership;

            let activated = sqlx::query(
                r#"
                UPDATE memberships
                SET status = ?, join_date = COALESCE(join_date, ?), updated_at = ?
                WHERE id = ? AND status = ?
                "#
            )
            .bind(MembershipStatus::Active.as_str())
            .bind(now.date_naive())
            .bind(now.naive_utc())
            .bind(payment.membership_id.to_string())
            .bind(MembershipStatus::PendingPayment.as_str())
            .execute(&mut *tx)
            .await?;

            if activated.rows_affected() == 0 {
                tracing::warn!(
                    "Payment {} settled for membership {} in status {}; membership left unchanged",
                    payment.id,
                    payment.membership_id,
                    status
                );
            }

            sqlx::query(
                r#"
                UPDATE membership_requests
                SET status = ?, updated_at = ?
                WHERE account_id = ? AND club_id = ? AND status = ?
                "#
            )
            .bind(RequestStatus::Completed.as_str())
            .bind(now.naive_utc())
            .bind(&account_id)
            .bind(&club_id)
            .bind(RequestStatus::ApprovedPendingPayment.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(SettlementResult::Applied(payment))
    }
}
