use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

use docflow_core::domain::directory::UserId;
use docflow_core::workflow::ReminderTier;

use super::{format_timestamp, parse_timestamp, RepositoryError};
use crate::{begin_immediate, DbPool};

/// Persisted record of sent deadline reminders, keyed by approver and tier.
#[derive(Clone)]
pub struct SqlReminderLedger {
    pool: DbPool,
}

impl SqlReminderLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Most recent send per approver and tier at or after `since`.
    pub async fn last_sent_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashMap<(UserId, ReminderTier), DateTime<Utc>>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT approver_user_id, tier, MAX(sent_at) AS last_sent
             FROM deadline_reminder
             WHERE sent_at >= ?
             GROUP BY approver_user_id, tier",
        )
        .bind(format_timestamp(since))
        .fetch_all(&self.pool)
        .await?;

        let mut last_sent = HashMap::with_capacity(rows.len());
        for row in rows {
            let tier_raw = row.try_get::<String, _>("tier")?;
            let tier = ReminderTier::parse(&tier_raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown reminder tier `{tier_raw}`"))
            })?;
            let approver = UserId(row.try_get("approver_user_id")?);
            let sent_at = parse_timestamp("last_sent", row.try_get("last_sent")?)?;
            last_sent.insert((approver, tier), sent_at);
        }

        Ok(last_sent)
    }

    /// Reserves the `(approver, tier)` slot for a send at `sent_at`.
    ///
    /// The check and the insert share one immediate transaction, so engines
    /// sharing the database cannot both claim the same slot. Returns `None`
    /// when a send inside the repeat window is already recorded. The returned
    /// id is handed to [`Self::release`] if delivery then fails.
    pub async fn claim(
        &self,
        approver: &UserId,
        tier: ReminderTier,
        document_count: usize,
        sent_at: DateTime<Utc>,
        repeat_after: Duration,
    ) -> Result<Option<i64>, RepositoryError> {
        let mut tx = begin_immediate(&self.pool).await?;

        let recent: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM deadline_reminder
                 WHERE approver_user_id = ? AND tier = ? AND sent_at > ?
             )",
        )
        .bind(&approver.0)
        .bind(tier.as_str())
        .bind(format_timestamp(sent_at - repeat_after))
        .fetch_one(&mut *tx)
        .await?;
        if recent == 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        let claim_id = sqlx::query(
            "INSERT INTO deadline_reminder (approver_user_id, tier, document_count, sent_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&approver.0)
        .bind(tier.as_str())
        .bind(i64::try_from(document_count).unwrap_or(i64::MAX))
        .bind(format_timestamp(sent_at))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;
        Ok(Some(claim_id))
    }

    /// Drops a claim whose delivery failed so the next sweep retries it.
    pub async fn release(&self, claim_id: i64) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM deadline_reminder WHERE id = ?")
            .bind(claim_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes sends older than `cutoff`, returning how many rows went.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM deadline_reminder WHERE sent_at < ?")
            .bind(format_timestamp(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
