//! Credential store - connected social accounts on the profile row
//!
//! All functions use the generic Executor pattern, allowing them to work
//! with both `&PgPool` (for standalone queries) and `&mut PgConnection`
//! (for transactions).

use serde::Serialize;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::{Platform, SocialAccounts};

/// Load the connected accounts for a user. Returns None when the profile
/// is missing or has no social_accounts payload.
pub async fn get_social_accounts<'e, E>(
    executor: E,
    user_id: Uuid,
) -> Result<Option<SocialAccounts>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(Option<serde_json::Value>,)> = sqlx::query_as(
        r#"
        SELECT social_accounts FROM profiles WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(row
        .and_then(|(value,)| value)
        .and_then(|value| SocialAccounts::from_json(&value)))
}

/// Write back one platform's credential object, leaving the others
/// untouched. Refreshed tokens must land immediately so concurrent
/// dispatches for the same user see them.
pub async fn update_platform_account<'e, E, A>(
    executor: E,
    user_id: Uuid,
    platform: Platform,
    account: &A,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
    A: Serialize + Sync,
{
    let value = serde_json::to_value(account).unwrap_or(serde_json::Value::Null);

    sqlx::query(
        r#"
        UPDATE profiles
        SET social_accounts = jsonb_set(
                COALESCE(social_accounts, '{}'::jsonb),
                ARRAY[$2],
                $3::jsonb
            ),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(platform.as_str())
    .bind(value)
    .execute(executor)
    .await?;

    Ok(())
}
