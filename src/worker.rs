//! Scheduled-post publishing worker
//!
//! Runs as a cron-driven background job and on demand from the trigger
//! endpoint. Each cycle claims due posts one at a time, resolves and
//! refreshes credentials, dispatches to the platform publisher, and writes
//! the outcome back. One post's failure never aborts the batch.

use apalis::prelude::*;
use apalis_cron::{CronStream, Schedule};
use apalis_sql::postgres::PostgresStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::AppState;
use crate::backoff::with_backoff;
use crate::constants::{
    DEFAULT_PUBLISH_CRON_MINUTES, MAX_PUBLISH_RETRIES, POST_PROCESSING_DELAY_SECS,
    PROCESSING_LEASE_SECS, PUBLISH_RETRY_BASE_DELAY_MS, RATE_LIMIT_BUFFER, WORKER_BATCH_SIZE,
};
use crate::domain::rate_limits::{self, Consume};
use crate::domain::{credentials, posts};
use crate::models::{Platform, PlatformRateLimit, ScheduledPost};
use crate::services::facebook::FacebookError;
use crate::services::instagram::InstagramError;
use crate::services::refresh;
use crate::services::twitter::TwitterError;

/// Result of one dispatch cycle, returned by the trigger endpoint
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub posts_processed: Vec<Uuid>,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn is_empty(&self) -> bool {
        self.posts_processed.is_empty() && self.errors.is_empty()
    }
}

/// A successful publish: the platform's post id plus any authoritative
/// rate-limit values it reported
struct PublishSuccess {
    platform_post_id: String,
    rate_limit: Option<PlatformRateLimit>,
}

/// Publish failure taxonomy. Rate-limited errors defer the post; the rest
/// mark it failed with the message stored verbatim.
#[derive(Debug)]
pub enum PublishError {
    Validation(String),
    Auth(String),
    RateLimited(String),
    Platform(String),
}

impl PublishError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PublishError::RateLimited(_))
    }
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Validation(m)
            | PublishError::Auth(m)
            | PublishError::RateLimited(m)
            | PublishError::Platform(m) => f.write_str(m),
        }
    }
}

impl From<TwitterError> for PublishError {
    fn from(e: TwitterError) -> Self {
        match e {
            TwitterError::RateLimited => PublishError::RateLimited(e.to_string()),
            TwitterError::Forbidden => PublishError::Auth(e.to_string()),
            TwitterError::Http(_) | TwitterError::Api(_) => PublishError::Platform(e.to_string()),
        }
    }
}

impl From<FacebookError> for PublishError {
    fn from(e: FacebookError) -> Self {
        PublishError::Platform(e.to_string())
    }
}

impl From<InstagramError> for PublishError {
    fn from(e: InstagramError) -> Self {
        match e {
            InstagramError::MissingImage => PublishError::Validation(e.to_string()),
            InstagramError::Http(_) | InstagramError::Api { .. } => {
                PublishError::Platform(e.to_string())
            }
        }
    }
}

/// Run one dispatch cycle: select due posts and drive each through a
/// single publish attempt, pacing between posts.
pub async fn process_due_posts(state: &AppState) -> RunSummary {
    let mut summary = RunSummary::default();

    // Claims left behind by a run that died mid-publish go back to the
    // queue once their lease lapses
    match posts::reclaim_stale(&state.db, PROCESSING_LEASE_SECS).await {
        Ok(0) => {}
        Ok(n) => println!("[worker] Reclaimed {} stale processing claims", n),
        Err(e) => eprintln!("[worker] Failed to reclaim stale claims: {}", e),
    }

    let due = match posts::list_due_posts(&state.db, WORKER_BATCH_SIZE).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[worker] Failed to list due posts: {}", e);
            summary.errors.push(format!("Failed to list due posts: {}", e));
            return summary;
        }
    };

    if due.is_empty() {
        return summary;
    }

    println!("[worker] Found {} due posts", due.len());

    for (i, post) in due.iter().enumerate() {
        // Pacing between dispatches keeps us under per-minute ceilings
        if i > 0 {
            tokio::time::sleep(Duration::from_secs(POST_PROCESSING_DELAY_SECS)).await;
        }
        process_one(state, post, &mut summary).await;
    }

    println!(
        "[worker] Cycle finished: {} published, {} errors",
        summary.posts_processed.len(),
        summary.errors.len()
    );

    summary
}

async fn process_one(state: &AppState, post: &ScheduledPost, summary: &mut RunSummary) {
    println!(
        "[worker] Processing post {} ({} for user {}, scheduled {})",
        post.id, post.platform, post.user_id, post.scheduled_for
    );

    // Claim pending -> processing; an overlapping run may have taken it
    match posts::claim_post(&state.db, post.id).await {
        Ok(true) => {}
        Ok(false) => {
            println!("[worker] Post {} already claimed, skipping", post.id);
            return;
        }
        Err(e) => {
            eprintln!("[worker] Failed to claim post {}: {}", post.id, e);
            summary
                .errors
                .push(format!("Post {}: claim failed: {}", post.id, e));
            return;
        }
    }

    let Some(platform) = post.platform() else {
        let msg = format!("Unsupported platform: {}", post.platform);
        fail_post(state, post.id, &msg, summary).await;
        return;
    };

    // Local quota check before spending a platform request
    let consume =
        match rate_limits::try_consume(&state.db, post.user_id, platform, RATE_LIMIT_BUFFER).await {
            Ok(Consume::Denied) => {
                defer_post(
                    state,
                    post.id,
                    &format!("{} rate limit reached, deferred to next cycle", platform),
                    summary,
                )
                .await;
                return;
            }
            Ok(c) => c,
            Err(e) => {
                eprintln!("[worker] Rate limit check failed for post {}: {}", post.id, e);
                defer_post(
                    state,
                    post.id,
                    &format!("rate limit check failed: {}", e),
                    summary,
                )
                .await;
                return;
            }
        };

    // Short exponential ride-out for platform 429s; anything else
    // surfaces on the first attempt
    let result = with_backoff(
        || publish_post(state, post, platform),
        PublishError::is_rate_limited,
        MAX_PUBLISH_RETRIES,
        Duration::from_millis(PUBLISH_RETRY_BASE_DELAY_MS),
    )
    .await;

    // An attempt was made; make sure a counter exists for the next cycle
    if consume == Consume::AllowedUntracked {
        if let Err(e) = rate_limits::seed_default(&state.db, post.user_id, platform).await {
            eprintln!(
                "[worker] Failed to seed rate limit counter for user {} on {}: {}",
                post.user_id, platform, e
            );
        }
    }

    match result {
        Ok(success) => {
            if let Some(limit) = success.rate_limit {
                if let Err(e) = rate_limits::record_platform_limits(
                    &state.db,
                    post.user_id,
                    platform,
                    limit.remaining,
                    limit.reset_at,
                )
                .await
                {
                    eprintln!(
                        "[worker] Failed to record platform rate limits for user {}: {}",
                        post.user_id, e
                    );
                }
            }

            match posts::mark_published(&state.db, post.id, &success.platform_post_id).await {
                Ok(()) => {
                    println!(
                        "[worker] Published post {} as {} id {}",
                        post.id, platform, success.platform_post_id
                    );
                    summary.posts_processed.push(post.id);
                }
                Err(e) => {
                    // The post is live on the platform but the status write
                    // failed; once the lease lapses the claim is reclaimed
                    // and the post may be published again
                    eprintln!(
                        "[worker] CRITICAL: post {} published as {} but status update failed: {}",
                        post.id, success.platform_post_id, e
                    );
                    summary
                        .errors
                        .push(format!("Post {}: published but status update failed: {}", post.id, e));
                }
            }
        }
        Err(e) if e.is_rate_limited() => {
            defer_post(state, post.id, &e.to_string(), summary).await;
        }
        Err(e) => {
            fail_post(state, post.id, &e.to_string(), summary).await;
        }
    }
}

/// Dispatch to the platform's publisher. Credentials are resolved fresh on
/// each attempt so a mid-backoff refresh is picked up.
async fn publish_post(
    state: &AppState,
    post: &ScheduledPost,
    platform: Platform,
) -> Result<PublishSuccess, PublishError> {
    let accounts = credentials::get_social_accounts(&state.db, post.user_id)
        .await
        .map_err(|e| PublishError::Platform(format!("Failed to load connected accounts: {}", e)))?
        .ok_or_else(|| {
            PublishError::Auth(format!(
                "No connected {} account found. Please reconnect your account.",
                platform
            ))
        })?;

    match platform {
        Platform::Twitter => {
            let auth = accounts.twitter.ok_or_else(|| {
                PublishError::Auth(
                    "Twitter account not connected. Please reconnect your Twitter account."
                        .to_string(),
                )
            })?;
            let auth = refresh::ensure_twitter_token(&state.db, &state.twitter, post.user_id, auth)
                .await
                .map_err(PublishError::Auth)?;

            let media_ids = match &post.image_url {
                Some(url) => {
                    let id = state
                        .twitter
                        .upload_media_from_url(&auth.access_token, url)
                        .await?;
                    Some(vec![id])
                }
                None => None,
            };

            let (tweet, rate_limit) = state
                .twitter
                .post_tweet(&auth.access_token, &post.content, media_ids.as_deref())
                .await?;

            Ok(PublishSuccess {
                platform_post_id: tweet.id,
                rate_limit,
            })
        }
        Platform::Facebook => {
            let auth = accounts.facebook.ok_or_else(|| {
                PublishError::Auth(
                    "Facebook account not connected. Please reconnect your Facebook account."
                        .to_string(),
                )
            })?;
            let auth =
                refresh::ensure_facebook_token(&state.db, &state.facebook, post.user_id, auth)
                    .await
                    .map_err(PublishError::Auth)?;

            let page = auth.pages.first().ok_or_else(|| {
                PublishError::Auth(
                    "No Facebook Pages found. Please reconnect your Facebook account."
                        .to_string(),
                )
            })?;

            let id = state
                .facebook
                .publish_to_page(page, &post.content, post.image_url.as_deref())
                .await?;

            Ok(PublishSuccess {
                platform_post_id: id,
                rate_limit: None,
            })
        }
        Platform::Instagram => {
            // Validate before touching credentials or the network
            if post.image_url.is_none() {
                return Err(InstagramError::MissingImage.into());
            }

            let auth = accounts.instagram.ok_or_else(|| {
                PublishError::Auth(
                    "Instagram account not connected. Please reconnect your Instagram account."
                        .to_string(),
                )
            })?;
            let auth =
                refresh::ensure_instagram_token(&state.db, &state.facebook, post.user_id, auth)
                    .await
                    .map_err(PublishError::Auth)?;

            let id = state
                .instagram
                .publish(&auth, &post.content, post.image_url.as_deref())
                .await?;

            Ok(PublishSuccess {
                platform_post_id: id,
                rate_limit: None,
            })
        }
    }
}

/// Mark a post failed, recording the message for the UI
async fn fail_post(state: &AppState, post_id: Uuid, message: &str, summary: &mut RunSummary) {
    eprintln!("[worker] Post {} failed: {}", post_id, message);
    if let Err(e) = posts::mark_failed(&state.db, post_id, message).await {
        eprintln!("[worker] Failed to mark post {} failed: {}", post_id, e);
    }
    summary.errors.push(format!("Post {}: {}", post_id, message));
}

/// Release a claimed post back to pending so the next cycle retries it.
/// Used for rate-limit deferrals, which are not publish failures.
async fn defer_post(state: &AppState, post_id: Uuid, reason: &str, summary: &mut RunSummary) {
    println!("[worker] Post {} deferred: {}", post_id, reason);
    if let Err(e) = posts::release_post(&state.db, post_id).await {
        eprintln!("[worker] Failed to release post {}: {}", post_id, e);
    }
    summary
        .errors
        .push(format!("Post {}: {} (will retry)", post_id, reason));
}

// ============== Cron trigger ==============

/// Cron job marker piped into apalis storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJob {
    pub scheduled_at: DateTime<Utc>,
}

impl From<DateTime<Utc>> for PublishJob {
    fn from(dt: DateTime<Utc>) -> Self {
        PublishJob { scheduled_at: dt }
    }
}

/// Job handler - one dispatch cycle per tick.
/// Always returns Ok: per-post failures live in the summary, and a failed
/// cycle must not crash the worker.
async fn run_publish_job(_job: PublishJob, ctx: Data<Arc<AppState>>) -> Result<(), Error> {
    let summary = process_due_posts(&ctx).await;
    if !summary.is_empty() {
        println!(
            "[worker] Cron tick complete: {} published, {} errors",
            summary.posts_processed.len(),
            summary.errors.len()
        );
    }
    Ok(())
}

/// Start the cron-driven publish worker
pub async fn run_publish_worker(state: Arc<AppState>) {
    let minutes = publish_cron_minutes();
    let schedule_expr = format!("0 */{} * * * *", minutes);

    // Run apalis migrations
    PostgresStorage::setup(&state.db)
        .await
        .expect("Failed to set up apalis storage");

    let storage: PostgresStorage<PublishJob> = PostgresStorage::new(state.db.clone());
    let schedule = Schedule::from_str(&schedule_expr).expect("Invalid publish worker schedule");
    let cron = CronStream::new(schedule);
    let backend = cron.pipe_to_storage(storage);

    println!("[worker] Publish worker starting (every {} min)", minutes);

    let worker = WorkerBuilder::new("publish-worker")
        .data(state)
        .backend(backend)
        .build_fn(run_publish_job);

    Monitor::new()
        .register(worker)
        .run()
        .await
        .expect("Publish worker monitor failed");
}

fn publish_cron_minutes() -> u64 {
    env::var("PUBLISH_CRON_MINUTES")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v >= 1 && *v <= 59)
        .unwrap_or(DEFAULT_PUBLISH_CRON_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_wire_shape() {
        let summary = RunSummary {
            posts_processed: vec![Uuid::nil()],
            errors: vec!["Post x: boom".to_string()],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "postsProcessed": ["00000000-0000-0000-0000-000000000000"],
                "errors": ["Post x: boom"]
            })
        );
    }

    #[test]
    fn test_twitter_error_mapping() {
        let e: PublishError = TwitterError::RateLimited.into();
        assert!(e.is_rate_limited());

        let e: PublishError = TwitterError::Forbidden.into();
        assert!(matches!(e, PublishError::Auth(_)));
        assert!(!e.is_rate_limited());

        let e: PublishError = TwitterError::Api("boom".into()).into();
        assert!(matches!(e, PublishError::Platform(_)));
    }

    #[test]
    fn test_instagram_error_mapping() {
        let e: PublishError = InstagramError::MissingImage.into();
        match &e {
            PublishError::Validation(msg) => {
                assert_eq!(msg, "Instagram posts require an image.")
            }
            other => panic!("unexpected: {:?}", other),
        }

        let e: PublishError = InstagramError::Api {
            phase: "media publish",
            message: "bad container".into(),
        }
        .into();
        assert!(matches!(e, PublishError::Platform(_)));
        assert!(e.to_string().contains("media publish"));
    }

    #[test]
    fn test_facebook_error_mapping() {
        let e: PublishError = FacebookError::Api("Invalid OAuth access token.".into()).into();
        assert!(matches!(e, PublishError::Platform(_)));
        assert_eq!(e.to_string(), "Invalid OAuth access token.");
    }
}
