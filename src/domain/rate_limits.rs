//! Per-(user, platform) publish quota counters
//!
//! The consume path is a single conditional UPDATE so check-and-decrement
//! is atomic across concurrent worker runs: the statement resets the
//! window when it has lapsed, or decrements while the remaining count is
//! above the safety buffer. No matching row at all means no counter has
//! been recorded yet, which allows the attempt.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::Platform;

/// Outcome of a consume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consume {
    /// Counter existed and the attempt was charged against it
    Allowed,
    /// No counter recorded yet; the attempt proceeds uncharged
    AllowedUntracked,
    /// Quota (minus buffer) exhausted until the window resets
    Denied,
}

/// The consume rule mirrored by the conditional UPDATE in [`try_consume`]:
/// a lapsed window counts as freshly reset to `max_count` before the
/// decrement, otherwise the decrement only happens while `remaining` is
/// above the buffer. Returns the new remaining count, or None for denial.
pub fn consume_decision(
    remaining: i32,
    max_count: i32,
    window_lapsed: bool,
    buffer: i32,
) -> Option<i32> {
    if window_lapsed {
        Some(max_count - 1)
    } else if remaining > buffer {
        Some(remaining - 1)
    } else {
        None
    }
}

/// Atomically consume one unit of quota for (user, platform)
pub async fn try_consume<'e, E>(
    pool: E,
    user_id: Uuid,
    platform: Platform,
    buffer: i32,
) -> Result<Consume, sqlx::Error>
where
    E: Executor<'e, Database = Postgres> + Copy,
{
    let updated: Option<(i32,)> = sqlx::query_as(
        r#"
        UPDATE rate_limits
        SET remaining = CASE
                WHEN NOW() >= reset_at THEN max_count - 1
                ELSE remaining - 1
            END,
            reset_at = CASE
                WHEN NOW() >= reset_at
                    THEN NOW() + (window_secs::text || ' seconds')::interval
                ELSE reset_at
            END,
            updated_at = NOW()
        WHERE user_id = $1 AND platform = $2
          AND (NOW() >= reset_at OR remaining > $3)
        RETURNING remaining
        "#,
    )
    .bind(user_id)
    .bind(platform.as_str())
    .bind(buffer)
    .fetch_optional(pool)
    .await?;

    if updated.is_some() {
        return Ok(Consume::Allowed);
    }

    // Zero rows: either the counter denied us or none exists yet
    let exists: Option<(i32,)> = sqlx::query_as(
        r#"
        SELECT remaining FROM rate_limits WHERE user_id = $1 AND platform = $2
        "#,
    )
    .bind(user_id)
    .bind(platform.as_str())
    .fetch_optional(pool)
    .await?;

    match exists {
        Some(_) => Ok(Consume::Denied),
        None => Ok(Consume::AllowedUntracked),
    }
}

/// Store authoritative values reported by the platform response. Mirrors
/// the upsert shape used at account-connect time: max tracks the highest
/// remaining seen, the window is derived from the reset instant.
pub async fn record_platform_limits<'e, E>(
    executor: E,
    user_id: Uuid,
    platform: Platform,
    remaining: i32,
    reset_at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let window_secs = (reset_at - Utc::now()).num_seconds().max(1);

    sqlx::query(
        r#"
        INSERT INTO rate_limits (user_id, platform, remaining, reset_at, window_secs, max_count, updated_at)
        VALUES ($1, $2, $3, $4, $5, $3, NOW())
        ON CONFLICT (user_id, platform) DO UPDATE SET
            remaining = $3,
            reset_at = $4,
            window_secs = $5,
            max_count = GREATEST(rate_limits.max_count, $3),
            updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(platform.as_str())
    .bind(remaining)
    .bind(reset_at)
    .bind(window_secs)
    .execute(executor)
    .await?;

    Ok(())
}

/// Seed a conservative counter after an attempt the platform reported no
/// limits for. Only inserts; an existing counter already tracks usage.
pub async fn seed_default<'e, E>(
    executor: E,
    user_id: Uuid,
    platform: Platform,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (max_count, window_secs) = platform.default_limit();

    sqlx::query(
        r#"
        INSERT INTO rate_limits (user_id, platform, remaining, reset_at, window_secs, max_count, updated_at)
        VALUES ($1, $2, $3 - 1, NOW() + ($4::text || ' seconds')::interval, $4, $3, NOW())
        ON CONFLICT (user_id, platform) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(platform.as_str())
    .bind(max_count)
    .bind(window_secs)
    .execute(executor)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lapsed_window_resets_before_decrement() {
        // An exhausted counter whose window lapsed is treated as max
        // again, then charged for this attempt
        assert_eq!(consume_decision(0, 50, true, 5), Some(49));
        // Same reset applies regardless of what remaining held
        assert_eq!(consume_decision(50, 50, true, 5), Some(49));
        assert_eq!(consume_decision(3, 50, true, 5), Some(49));
    }

    #[test]
    fn test_buffer_floor_within_window() {
        assert_eq!(consume_decision(6, 50, false, 5), Some(5));
        // At or below the buffer the attempt is denied
        assert_eq!(consume_decision(5, 50, false, 5), None);
        assert_eq!(consume_decision(0, 50, false, 5), None);
    }
}
