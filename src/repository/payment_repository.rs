use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{NewPayment, OrderCode, Payment, PaymentMethod, PaymentStatus},
    error::{AppError, Result},
    repository::{parse_uuid, violates_index, PaymentRepository},
};

pub(crate) const PAYMENT_COLUMNS: &str = r#"
    id, membership_id, club_id, amount, method, status,
    order_code, paid_date, description, created_at, updated_at
"#;

#[derive(FromRow)]
pub(crate) struct PaymentRow {
    id: String,
    membership_id: String,
    club_id: String,
    amount: i64,
    method: Option<String>,
    status: String,
    order_code: i64,
    paid_date: Option<NaiveDateTime>,
    description: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl PaymentRow {
    pub(crate) fn into_payment(self) -> Result<Payment> {
        Ok(Payment {
            id: parse_uuid(&self.id)?,
            membership_id: parse_uuid(&self.membership_id)?,
            club_id: parse_uuid(&self.club_id)?,
            amount: self.amount,
            method: self
                .method
                .as_deref()
                .map(|m| {
                    PaymentMethod::from_str(m)
                        .ok_or_else(|| AppError::Database(format!("Invalid payment method: {}", m)))
                })
                .transpose()?,
            status: PaymentStatus::from_str(&self.status).ok_or_else(|| {
                AppError::Database(format!("Invalid payment status: {}", self.status))
            })?,
            order_code: OrderCode::new(self.order_code).ok_or_else(|| {
                AppError::Database(format!("Invalid order code: {}", self.order_code))
            })?,
            paid_date: self.paid_date.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            description: self.description,
            created_at: DateTime::from_naive_utc_and_offset(self.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(self.updated_at, Utc),
        })
    }
}

/// Maps insert failures on `payments` onto the two uniqueness rules the
/// table enforces.
pub(crate) fn map_payment_insert_error(err: sqlx::Error, order_code: OrderCode) -> AppError {
    if violates_index(&err, "order_code") {
        AppError::DuplicateOrderCode(order_code.get())
    } else if violates_index(&err, "membership_id") {
        AppError::Conflict("Membership already has a pending payment".to_string())
    } else {
        AppError::Database(err.to_string())
    }
}

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: NewPayment) -> Result<Payment> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, membership_id, club_id, amount, method, status,
                order_code, paid_date, description, created_at, updated_at
            ) VALUES (?, ?, ?, ?, NULL, ?, ?, NULL, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(payment.membership_id.to_string())
        .bind(payment.club_id.to_string())
        .bind(payment.amount)
        .bind(PaymentStatus::Pending.as_str())
        .bind(payment.order_code.get())
        .bind(&payment.description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_payment_insert_error(e, payment.order_code))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created payment".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRow::into_payment).transpose()
    }

    async fn find_by_order_code(&self, order_code: OrderCode) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE order_code = ?",
            PAYMENT_COLUMNS
        ))
        .bind(order_code.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRow::into_payment).transpose()
    }

    async fn find_by_membership(&self, membership_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE membership_id = ? ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))
        .bind(membership_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(PaymentRow::into_payment)
            .collect()
    }

    async fn find_pending_for_membership(&self, membership_id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE membership_id = ? AND status = ?",
            PAYMENT_COLUMNS
        ))
        .bind(membership_id.to_string())
        .bind(PaymentStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRow::into_payment).transpose()
    }

    async fn assign_method(&self, id: Uuid, method: PaymentMethod) -> Result<()> {
        // Only pending rows; a settled payment keeps the method it settled with.
        sqlx::query("UPDATE payments SET method = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(method.as_str())
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .bind(PaymentStatus::Pending.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
