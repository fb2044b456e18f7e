//! Application constants

/// Maximum due posts processed per dispatcher invocation
pub const WORKER_BATCH_SIZE: i64 = 10;

/// Pacing delay between posts within a batch (seconds)
pub const POST_PROCESSING_DELAY_SECS: u64 = 5;

/// Safety margin left on a platform quota so we never exhaust it exactly
pub const RATE_LIMIT_BUFFER: i32 = 5;

/// Retries for rate-limited publish attempts before deferring the post
pub const MAX_PUBLISH_RETRIES: u32 = 3;

/// Base delay for the exponential publish backoff (milliseconds)
pub const PUBLISH_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Twitter allows 50 tweets per 15-minute window per user
pub const TWITTER_DEFAULT_MAX: i32 = 50;
pub const TWITTER_DEFAULT_WINDOW_SECS: i64 = 15 * 60;

/// Conservative Facebook page-publishing placeholder
pub const FACEBOOK_DEFAULT_MAX: i32 = 50;
pub const FACEBOOK_DEFAULT_WINDOW_SECS: i64 = 60 * 60;

/// Conservative Instagram content-publishing placeholder
pub const INSTAGRAM_DEFAULT_MAX: i32 = 25;
pub const INSTAGRAM_DEFAULT_WINDOW_SECS: i64 = 60 * 60;

/// A `processing` claim older than this belongs to a dead run and is
/// reclaimed at the start of the next cycle (seconds)
pub const PROCESSING_LEASE_SECS: i64 = 15 * 60;

/// Timeout applied to every outbound platform request (seconds)
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default cron cadence for the timer trigger (minutes)
pub const DEFAULT_PUBLISH_CRON_MINUTES: u64 = 5;
