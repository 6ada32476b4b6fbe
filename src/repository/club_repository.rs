use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::Club,
    error::Result,
    repository::{parse_uuid, ClubDirectory},
};

#[derive(FromRow)]
struct ClubRow {
    id: String,
    name: String,
    membership_fee: i64,
}

pub struct SqliteClubDirectory {
    pool: SqlitePool,
}

impl SqliteClubDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert used by the seed binary and tests; the production club
    /// service writes these tables directly.
    pub async fn upsert(&self, club: &Club) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clubs (id, name, membership_fee)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                membership_fee = excluded.membership_fee,
                updated_at = CURRENT_TIMESTAMP
            "#
        )
        .bind(club.id.to_string())
        .bind(&club.name)
        .bind(club.membership_fee)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn add_leader(&self, club_id: Uuid, account_id: Uuid) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO club_leaders (club_id, account_id) VALUES (?, ?)")
            .bind(club_id.to_string())
            .bind(account_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ClubDirectory for SqliteClubDirectory {
    async fn get_club(&self, club_id: Uuid) -> Result<Option<Club>> {
        let row = sqlx::query_as::<_, ClubRow>(
            "SELECT id, name, membership_fee FROM clubs WHERE id = ?"
        )
        .bind(club_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(Club {
                id: parse_uuid(&r.id)?,
                name: r.name,
                membership_fee: r.membership_fee,
            })
        })
        .transpose()
    }

    async fn is_leader_of_club(&self, club_id: Uuid, account_id: Uuid) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM club_leaders WHERE club_id = ? AND account_id = ?"
        )
        .bind(club_id.to_string())
        .bind(account_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}
