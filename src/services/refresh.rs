//! Token refresh helpers
//!
//! Each helper checks expiry, refreshes through the platform's exchange,
//! and persists the new credential immediately so concurrent dispatches
//! for the same user pick it up. Errors are reconnect-grade: the caller
//! fails the post and the user reconnects the account.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::credentials;
use crate::models::{FacebookAuth, InstagramAuth, Platform, TwitterAuth};
use crate::services::facebook::FacebookClient;
use crate::services::twitter::TwitterClient;

/// Ensure a usable Twitter credential, refreshing through the rotating
/// refresh-token grant when expired.
pub async fn ensure_twitter_token(
    db: &PgPool,
    client: &TwitterClient,
    user_id: Uuid,
    auth: TwitterAuth,
) -> Result<TwitterAuth, String> {
    if !auth.is_expired(Utc::now()) {
        return Ok(auth);
    }

    println!("[refresh] Twitter token expired for user {}, refreshing", user_id);

    let refresh_token = auth
        .refresh_token
        .clone()
        .ok_or("Twitter token expired and no refresh token is stored. Please reconnect your Twitter account.")?;

    let response = client.refresh_token(&refresh_token).await.map_err(|e| {
        eprintln!("[refresh] Twitter refresh failed for user {}: {}", user_id, e);
        "Failed to refresh Twitter token. Please reconnect your Twitter account.".to_string()
    })?;

    let refreshed = TwitterAuth {
        access_token: response.access_token,
        // Refresh tokens rotate; keep the old one only if the response
        // omitted a replacement
        refresh_token: response.refresh_token.or(Some(refresh_token)),
        expires_at: Utc::now() + Duration::seconds(response.expires_in),
    };

    credentials::update_platform_account(db, user_id, Platform::Twitter, &refreshed)
        .await
        .map_err(|e| format!("Failed to store refreshed Twitter token: {}", e))?;

    Ok(refreshed)
}

/// Ensure a usable Facebook credential via the long-lived token exchange.
/// Page-scoped tokens are left untouched; they are re-derived when the
/// user reconnects.
pub async fn ensure_facebook_token(
    db: &PgPool,
    client: &FacebookClient,
    user_id: Uuid,
    auth: FacebookAuth,
) -> Result<FacebookAuth, String> {
    if !auth.is_expired(Utc::now()) {
        return Ok(auth);
    }

    println!("[refresh] Facebook token expired for user {}, exchanging", user_id);

    let token = client
        .exchange_long_lived_token(&auth.access_token)
        .await
        .map_err(|e| {
            eprintln!("[refresh] Facebook exchange failed for user {}: {}", user_id, e);
            "Failed to refresh Facebook token. Please reconnect your Facebook account.".to_string()
        })?;

    let refreshed = FacebookAuth {
        access_token: token.access_token,
        expires_at: token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs)),
        pages: auth.pages,
    };

    credentials::update_platform_account(db, user_id, Platform::Facebook, &refreshed)
        .await
        .map_err(|e| format!("Failed to store refreshed Facebook token: {}", e))?;

    Ok(refreshed)
}

/// Ensure a usable Instagram credential. Instagram rides the same
/// Facebook-family exchange.
pub async fn ensure_instagram_token(
    db: &PgPool,
    client: &FacebookClient,
    user_id: Uuid,
    auth: InstagramAuth,
) -> Result<InstagramAuth, String> {
    if !auth.is_expired(Utc::now()) {
        return Ok(auth);
    }

    println!("[refresh] Instagram token expired for user {}, exchanging", user_id);

    let token = client
        .exchange_long_lived_token(&auth.access_token)
        .await
        .map_err(|e| {
            eprintln!("[refresh] Instagram exchange failed for user {}: {}", user_id, e);
            "Failed to refresh Instagram token. Please reconnect your Instagram account.".to_string()
        })?;

    let refreshed = InstagramAuth {
        access_token: token.access_token,
        instagram_account_id: auth.instagram_account_id,
        expires_at: token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs)),
    };

    credentials::update_platform_account(db, user_id, Platform::Instagram, &refreshed)
        .await
        .map_err(|e| format!("Failed to store refreshed Instagram token: {}", e))?;

    Ok(refreshed)
}
