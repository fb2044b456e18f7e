//! Shared data models used across modules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    FACEBOOK_DEFAULT_MAX, FACEBOOK_DEFAULT_WINDOW_SECS, INSTAGRAM_DEFAULT_MAX,
    INSTAGRAM_DEFAULT_WINDOW_SECS, TWITTER_DEFAULT_MAX, TWITTER_DEFAULT_WINDOW_SECS,
};

/// Target social platform for a scheduled post.
///
/// Closed set: adding a platform means adding a variant here plus a publish
/// routine in the worker, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Twitter,
    Facebook,
    Instagram,
}

impl Platform {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "twitter" => Some(Platform::Twitter),
            "facebook" => Some(Platform::Facebook),
            "instagram" => Some(Platform::Instagram),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }

    /// Conservative (max, window_secs) used when the platform reports no
    /// authoritative rate-limit values
    pub fn default_limit(&self) -> (i32, i64) {
        match self {
            Platform::Twitter => (TWITTER_DEFAULT_MAX, TWITTER_DEFAULT_WINDOW_SECS),
            Platform::Facebook => (FACEBOOK_DEFAULT_MAX, FACEBOOK_DEFAULT_WINDOW_SECS),
            Platform::Instagram => (INSTAGRAM_DEFAULT_MAX, INSTAGRAM_DEFAULT_WINDOW_SECS),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a scheduled post.
/// `pending -> processing -> published | failed`; a failed post re-enters
/// `pending` only through an explicit requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStatus {
    Pending,
    Processing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Processing => "processing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }
}

/// A scheduled post row. Platform and status are stored as text; an
/// unparseable platform is handled per-post in the worker, not here.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduledPost {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: String,
    pub content: String,
    pub image_url: Option<String>,
    pub scheduled_for: DateTime<Utc>,
}

impl ScheduledPost {
    pub fn platform(&self) -> Option<Platform> {
        Platform::parse(&self.platform)
    }
}

/// Per-user connected accounts, stored as JSONB on the profile row.
/// Shape matches what the OAuth callback layer writes; unknown keys are
/// ignored so the worker tolerates additions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialAccounts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<TwitterAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<FacebookAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<InstagramAuth>,
}

impl SocialAccounts {
    /// Parse from serde_json::Value (for JSONB reads)
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Twitter user tokens. These always expire and carry a rotating refresh
/// token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterAuth {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TwitterAuth {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Facebook user token plus the pages it can publish to. Long-lived; a
/// missing expiry means non-expiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookAuth {
    pub access_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pages: Vec<FacebookPage>,
}

impl FacebookAuth {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }
}

/// A Facebook Page with its page-scoped access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookPage {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub instagram_account_id: Option<String>,
}

/// Instagram Business Account credential (Facebook-family token)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramAuth {
    pub access_token: String,
    pub instagram_account_id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl InstagramAuth {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }
}

/// Authoritative rate-limit values reported by a platform response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformRateLimit {
    pub remaining: i32,
    pub reset_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        for p in [Platform::Twitter, Platform::Facebook, Platform::Instagram] {
            assert_eq!(Platform::parse(p.as_str()), Some(p));
        }
        assert_eq!(Platform::parse("tiktok"), None);
        assert_eq!(Platform::parse("Twitter"), None);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(PostStatus::Pending.as_str(), "pending");
        assert_eq!(PostStatus::Processing.as_str(), "processing");
        assert_eq!(PostStatus::Published.as_str(), "published");
        assert_eq!(PostStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_social_accounts_decode() {
        // Shape written by the OAuth callback layer
        let value = serde_json::json!({
            "twitter": {
                "access_token": "tw-token",
                "refresh_token": "tw-refresh",
                "expires_at": "2026-01-01T00:00:00Z"
            },
            "facebook": {
                "access_token": "fb-token",
                "pages": [
                    {
                        "id": "page-1",
                        "name": "First Page",
                        "access_token": "page-token",
                        "instagram_account_id": "ig-1"
                    },
                    { "id": "page-2", "access_token": "page-token-2" }
                ]
            },
            "linkedin": { "access_token": "ignored" }
        });

        let accounts = SocialAccounts::from_json(&value).expect("decode");
        let twitter = accounts.twitter.expect("twitter");
        assert_eq!(twitter.refresh_token.as_deref(), Some("tw-refresh"));

        let facebook = accounts.facebook.expect("facebook");
        assert_eq!(facebook.pages.len(), 2);
        assert_eq!(facebook.pages[0].id, "page-1");
        assert_eq!(
            facebook.pages[0].instagram_account_id.as_deref(),
            Some("ig-1")
        );
        // No expiry means the long-lived token never counts as expired
        assert!(!facebook.is_expired(chrono::Utc::now()));

        assert!(accounts.instagram.is_none());
    }

    #[test]
    fn test_twitter_expiry() {
        let now = chrono::Utc::now();
        let auth = TwitterAuth {
            access_token: "t".into(),
            refresh_token: None,
            expires_at: now - chrono::Duration::seconds(1),
        };
        assert!(auth.is_expired(now));
    }
}
