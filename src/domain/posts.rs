//! Scheduled-post lifecycle queries
//!
//! All functions use the generic Executor pattern, allowing them to work
//! with both `&PgPool` (for standalone queries) and `&mut PgConnection`
//! (for transactions). Status transitions are conditional updates so
//! overlapping worker runs cannot both move the same post.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::{PostStatus, ScheduledPost};

/// List due posts: pending and past their scheduled time, oldest first,
/// capped so one invocation stays bounded.
pub async fn list_due_posts<'e, E>(
    executor: E,
    limit: i64,
) -> Result<Vec<ScheduledPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, user_id, platform, content, image_url, scheduled_for
        FROM scheduled_posts
        WHERE status = $1 AND scheduled_for <= NOW()
        ORDER BY scheduled_for ASC
        LIMIT $2
        "#,
    )
    .bind(PostStatus::Pending.as_str())
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// Claim a post for publishing (atomic `pending -> processing`).
/// Returns false if another run already claimed it.
pub async fn claim_post<'e, E>(executor: E, post_id: Uuid) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = $2, updated_at = NOW()
        WHERE id = $1 AND status = $3
        "#,
    )
    .bind(post_id)
    .bind(PostStatus::Processing.as_str())
    .bind(PostStatus::Pending.as_str())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record a successful publish with the platform-assigned post id
pub async fn mark_published<'e, E>(
    executor: E,
    post_id: Uuid,
    platform_post_id: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = $2,
            platform_post_id = $3,
            published_at = NOW(),
            error_message = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(post_id)
    .bind(PostStatus::Published.as_str())
    .bind(platform_post_id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Record a failed publish attempt. Failed posts wait for an explicit
/// requeue; the worker never re-selects them.
pub async fn mark_failed<'e, E>(
    executor: E,
    post_id: Uuid,
    error_message: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = $2, error_message = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(post_id)
    .bind(PostStatus::Failed.as_str())
    .bind(error_message)
    .execute(executor)
    .await?;

    Ok(())
}

/// Give a claimed post back to the queue (rate-limit deferral). The post
/// stays eligible for the next cycle instead of being marked failed.
pub async fn release_post<'e, E>(executor: E, post_id: Uuid) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = $2, updated_at = NOW()
        WHERE id = $1 AND status = $3
        "#,
    )
    .bind(post_id)
    .bind(PostStatus::Pending.as_str())
    .bind(PostStatus::Processing.as_str())
    .execute(executor)
    .await?;

    Ok(())
}

/// Return stale `processing` claims to the queue. A claim whose lease has
/// lapsed belongs to a run that died mid-publish; without this the post
/// would never be selected again.
pub async fn reclaim_stale<'e, E>(executor: E, lease_secs: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = $1, updated_at = NOW()
        WHERE status = $2
          AND updated_at < NOW() - ($3::text || ' seconds')::interval
        "#,
    )
    .bind(PostStatus::Pending.as_str())
    .bind(PostStatus::Processing.as_str())
    .bind(lease_secs)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Lease cutoff mirrored by the interval comparison in [`reclaim_stale`]:
/// a claim is stale once it is strictly older than the lease.
pub fn claim_is_stale(updated_at: DateTime<Utc>, now: DateTime<Utc>, lease_secs: i64) -> bool {
    updated_at < now - Duration::seconds(lease_secs)
}

/// Requeue a failed post for another attempt (the user-facing "Retry"
/// action). Scoped to the owning user; returns false if no matching
/// failed post exists.
pub async fn requeue_failed<'e, E>(
    executor: E,
    post_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = $3, error_message = NULL, updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND status = $4
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .bind(PostStatus::Pending.as_str())
    .bind(PostStatus::Failed.as_str())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_staleness_cutoff() {
        let now = Utc::now();
        let lease = 900;

        // A fresh claim is never stale
        assert!(!claim_is_stale(now, now, lease));
        // Exactly lease-old is still within the lease
        assert!(!claim_is_stale(now - Duration::seconds(lease), now, lease));
        // Older than the lease is reclaimable
        assert!(claim_is_stale(
            now - Duration::seconds(lease + 1),
            now,
            lease
        ));
    }
}
