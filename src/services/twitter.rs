//! Twitter publishing client
//!
//! Publishing is one call for text-only tweets and two for image tweets:
//! a multipart media upload first, then the tweet referencing the returned
//! media id. Token refresh uses the OAuth2 token endpoint with
//! client-credential basic auth.

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::PlatformRateLimit;

const TWEETS_URL: &str = "https://api.twitter.com/2/tweets";
const MEDIA_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
const TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";

#[derive(Clone)]
pub struct TwitterClient {
    client_id: String,
    client_secret: String,
    http: Client,
}

impl TwitterClient {
    pub fn new(client_id: &str, client_secret: &str, http: Client) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            http,
        }
    }

    /// Build Basic auth header for OAuth token requests
    fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.client_id, self.client_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    /// Exchange a refresh token for a new access/refresh token pair.
    /// Twitter refresh tokens rotate: the response carries the replacement.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, TwitterError> {
        let params = [
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let resp = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", self.basic_auth_header())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&params)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(TwitterError::Api(format!(
                "Token refresh failed: {}",
                text
            )));
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token)
    }

    /// Download an image by URL and upload it as tweet media.
    /// Returns the media id to embed in the tweet body.
    pub async fn upload_media_from_url(
        &self,
        access_token: &str,
        image_url: &str,
    ) -> Result<String, TwitterError> {
        let image_resp = self.http.get(image_url).send().await?;
        if !image_resp.status().is_success() {
            return Err(TwitterError::Api(format!(
                "Failed to fetch image {}: status {}",
                image_url,
                image_resp.status()
            )));
        }
        let bytes = image_resp.bytes().await?;

        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name("image.jpg");
        let form = reqwest::multipart::Form::new().part("media", part);

        let resp = self
            .http
            .post(MEDIA_UPLOAD_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(classify_response(status, text));
        }

        let wrapper: MediaUploadResponse = serde_json::from_str(&text).map_err(|e| {
            TwitterError::Api(format!("Failed to parse media upload response: {} - body: {}", e, text))
        })?;
        Ok(wrapper.media_id_string)
    }

    /// Create a tweet, optionally referencing previously uploaded media.
    /// Returns the tweet id and any rate-limit values Twitter reported.
    pub async fn post_tweet(
        &self,
        access_token: &str,
        text: &str,
        media_ids: Option<&[String]>,
    ) -> Result<(TweetResponse, Option<PlatformRateLimit>), TwitterError> {
        let body = build_tweet_body(text, media_ids);

        let resp = self
            .http
            .post(TWEETS_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let rate_limit = parse_rate_limit_headers(resp.headers());
        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await?;
            return Err(classify_response(status, text));
        }

        let wrapper: TweetResponseWrapper = resp.json().await?;
        Ok((wrapper.data, rate_limit))
    }
}

/// JSON body for tweet creation: `{ text, media?: { media_ids } }`
fn build_tweet_body(text: &str, media_ids: Option<&[String]>) -> serde_json::Value {
    let mut body = serde_json::json!({ "text": text });
    if let Some(ids) = media_ids {
        if !ids.is_empty() {
            body["media"] = serde_json::json!({ "media_ids": ids });
        }
    }
    body
}

/// Map a non-2xx Twitter response to the error taxonomy. 429 and 403 are
/// surfaced as distinct conditions; everything else keeps the raw body.
fn classify_response(status: StatusCode, body: String) -> TwitterError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => TwitterError::RateLimited,
        StatusCode::FORBIDDEN => TwitterError::Forbidden,
        _ => TwitterError::Api(format!("Twitter API error: {}", body)),
    }
}

/// Read `x-rate-limit-remaining` / `x-rate-limit-reset` (epoch seconds)
fn parse_rate_limit_headers(headers: &HeaderMap) -> Option<PlatformRateLimit> {
    let remaining: i32 = headers
        .get("x-rate-limit-remaining")?
        .to_str()
        .ok()?
        .parse()
        .ok()?;
    let reset_epoch: i64 = headers
        .get("x-rate-limit-reset")?
        .to_str()
        .ok()?
        .parse()
        .ok()?;
    let reset_at: DateTime<Utc> = Utc.timestamp_opt(reset_epoch, 0).single()?;
    Some(PlatformRateLimit {
        remaining,
        reset_at,
    })
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct TweetResponseWrapper {
    data: TweetResponse,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TweetResponse {
    pub id: String,
    pub text: String,
}

#[derive(Debug)]
pub enum TwitterError {
    Http(reqwest::Error),
    RateLimited,
    Forbidden,
    Api(String),
}

impl From<reqwest::Error> for TwitterError {
    fn from(e: reqwest::Error) -> Self {
        TwitterError::Http(e)
    }
}

impl std::fmt::Display for TwitterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TwitterError::Http(e) => write!(f, "HTTP error: {}", e),
            TwitterError::RateLimited => {
                write!(f, "Twitter rate limit exceeded. Please try again later.")
            }
            TwitterError::Forbidden => write!(
                f,
                "Twitter API permission denied. Please check your app permissions and user token scopes."
            ),
            TwitterError::Api(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for TwitterError {}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_tweet_body_text_only() {
        let body = build_tweet_body("Hello world", None);
        assert_eq!(body, serde_json::json!({ "text": "Hello world" }));
        // An empty media list must not produce a media key either
        let body = build_tweet_body("Hello world", Some(&[]));
        assert!(body.get("media").is_none());
    }

    #[test]
    fn test_tweet_body_embeds_media_ids() {
        let ids = vec!["123".to_string()];
        let body = build_tweet_body("caption", Some(&ids));
        assert_eq!(
            body,
            serde_json::json!({
                "text": "caption",
                "media": { "media_ids": ["123"] }
            })
        );
    }

    #[test]
    fn test_classify_response() {
        assert!(matches!(
            classify_response(StatusCode::TOO_MANY_REQUESTS, "slow down".into()),
            TwitterError::RateLimited
        ));
        assert!(matches!(
            classify_response(StatusCode::FORBIDDEN, "nope".into()),
            TwitterError::Forbidden
        ));
        match classify_response(StatusCode::INTERNAL_SERVER_ERROR, "boom".into()) {
            TwitterError::Api(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-rate-limit-remaining", HeaderValue::from_static("42"));
        headers.insert(
            "x-rate-limit-reset",
            HeaderValue::from_static("1700000000"),
        );

        let limit = parse_rate_limit_headers(&headers).expect("parsed");
        assert_eq!(limit.remaining, 42);
        assert_eq!(limit.reset_at.timestamp(), 1700000000);

        headers.remove("x-rate-limit-reset");
        assert!(parse_rate_limit_headers(&headers).is_none());
    }
}
