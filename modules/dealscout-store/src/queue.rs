// Outreach queue persistence.
//
// Claim and every status transition are atomic: claim_due locks candidate
// rows with FOR UPDATE SKIP LOCKED inside a single statement, and the
// transition helpers are single-statement CAS updates guarded on the current
// status. Two overlapping processor runs can never move the same item.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use dealscout_common::types::{OutreachQueueItem, OutreachRecord};

use crate::error::Result;
use crate::rows::{OutreachRecordRow, QueueItemRow};
use crate::PgStore;

impl PgStore {
    pub async fn insert_queue_item(&self, item: &OutreachQueueItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outreach_queue
                (id, user_id, founder_id, startup_id, channel, subject, body,
                 status, priority, scheduled_for, attempts, max_attempts,
                 last_error, sent_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(item.id)
        .bind(item.user_id)
        .bind(item.founder_id)
        .bind(item.startup_id)
        .bind(item.channel.as_str())
        .bind(&item.subject)
        .bind(&item.body)
        .bind(item.status.as_str())
        .bind(item.priority)
        .bind(item.scheduled_for)
        .bind(item.attempts)
        .bind(item.max_attempts)
        .bind(&item.last_error)
        .bind(item.sent_at)
        .bind(item.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_queue_item(&self, id: Uuid) -> Result<Option<OutreachQueueItem>> {
        let row = sqlx::query_as::<_, QueueItemRow>("SELECT * FROM outreach_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(OutreachQueueItem::try_from).transpose()
    }

    /// The per-founder active-item guard: true when the founder already has
    /// an item in `queued` or `sending`.
    pub async fn has_active_item(&self, founder_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM outreach_queue
                WHERE founder_id = $1 AND status IN ('queued', 'sending')
            )
            "#,
        )
        .bind(founder_id)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    /// Atomically claim up to `limit` due items for one user: flips them
    /// queued -> sending and returns them. SKIP LOCKED guarantees two
    /// concurrent callers never claim the same row.
    pub async fn claim_due(
        &self,
        user_id: Uuid,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutreachQueueItem>> {
        let rows = sqlx::query_as::<_, QueueItemRow>(
            r#"
            UPDATE outreach_queue SET status = 'sending'
            WHERE id IN (
                SELECT id FROM outreach_queue
                WHERE user_id = $1 AND status = 'queued' AND scheduled_for <= $2
                ORDER BY priority ASC, scheduled_for ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        let mut items: Vec<OutreachQueueItem> = rows
            .into_iter()
            .map(OutreachQueueItem::try_from)
            .collect::<Result<_>>()?;
        // RETURNING order is not guaranteed; restore claim order
        items.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.scheduled_for.cmp(&b.scheduled_for))
        });
        Ok(items)
    }

    /// Users that currently have at least one claimable item.
    pub async fn users_with_due_items(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let users = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT user_id FROM outreach_queue
            WHERE status = 'queued' AND scheduled_for <= $1
            "#,
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        Ok(users)
    }

    /// CAS sending -> sent, inserting the immutable history record in the
    /// same transaction. Returns false (and writes nothing) when the item
    /// was not in `sending`, so a duplicate call never duplicates history.
    pub async fn complete_item(
        &self,
        id: Uuid,
        record: &OutreachRecord,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE outreach_queue SET status = 'sent', sent_at = $2
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO outreach_history
                (id, user_id, founder_id, startup_id, channel, subject, body, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.founder_id)
        .bind(record.startup_id)
        .bind(record.channel.as_str())
        .bind(&record.subject)
        .bind(&record.body)
        .bind(record.sent_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// CAS sending -> queued for a recoverable failure: increments attempts
    /// and reschedules.
    pub async fn requeue_item(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outreach_queue
            SET status = 'queued', attempts = attempts + 1,
                last_error = $2, scheduled_for = $3
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry_at)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS sending -> failed, terminal.
    pub async fn fail_item(&self, id: Uuid, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outreach_queue
            SET status = 'failed', attempts = attempts + 1, last_error = $2
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete, but only from `queued`. In-flight and terminal items stay.
    pub async fn delete_if_queued(&self, id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM outreach_queue WHERE id = $1 AND status = 'queued'")
                .bind(id)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS failed -> queued with attempts reset and immediate reschedule.
    pub async fn reset_failed_item(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outreach_queue
            SET status = 'queued', attempts = 0, last_error = NULL,
                scheduled_for = $2
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_failed_items(&self, user_id: Uuid) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM outreach_queue WHERE user_id = $1 AND status = 'failed'")
                .bind(user_id)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected())
    }

    pub async fn history_for_founder(&self, founder_id: Uuid) -> Result<Vec<OutreachRecord>> {
        let rows = sqlx::query_as::<_, OutreachRecordRow>(
            "SELECT * FROM outreach_history WHERE founder_id = $1 ORDER BY sent_at DESC",
        )
        .bind(founder_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(OutreachRecord::try_from).collect()
    }
}
