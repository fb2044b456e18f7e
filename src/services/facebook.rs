//! Facebook Page publishing client
//!
//! Posts go to a Page, not the user: the credential's first page supplies
//! the page id and page-scoped access token. Image posts hit the photos
//! endpoint, text posts the feed endpoint, both form-encoded.

use reqwest::Client;
use serde::Deserialize;

use crate::models::FacebookPage;

const GRAPH_BASE: &str = "https://graph.facebook.com/v18.0";

#[derive(Clone)]
pub struct FacebookClient {
    app_id: String,
    app_secret: String,
    http: Client,
}

impl FacebookClient {
    pub fn new(app_id: &str, app_secret: &str, http: Client) -> Self {
        Self {
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
            http,
        }
    }

    /// Publish to a Page feed (text) or photos endpoint (image).
    /// Returns the platform-assigned post id.
    pub async fn publish_to_page(
        &self,
        page: &FacebookPage,
        message: &str,
        image_url: Option<&str>,
    ) -> Result<String, FacebookError> {
        let url = publish_endpoint(&page.id, image_url.is_some());

        let mut params: Vec<(&str, &str)> = vec![
            ("message", message),
            ("access_token", &page.access_token),
        ];
        if let Some(image) = image_url {
            params.push(("url", image));
        }

        let resp = self.http.post(&url).form(&params).send().await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(FacebookError::Api(extract_graph_error(&text)));
        }

        let result: PublishResponse = resp.json().await?;
        // Photo posts carry a separate post_id alongside the photo id
        Ok(result.post_id.unwrap_or(result.id))
    }

    /// Exchange a token for a long-lived one. Used as a defensive refresh
    /// for Facebook-family credentials that carry an expiry in the past.
    pub async fn exchange_long_lived_token(
        &self,
        access_token: &str,
    ) -> Result<LongLivedToken, FacebookError> {
        let url = format!("{}/oauth/access_token", GRAPH_BASE);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", &self.app_id),
                ("client_secret", &self.app_secret),
                ("fb_exchange_token", access_token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(FacebookError::Api(extract_graph_error(&text)));
        }

        let token: LongLivedToken = resp.json().await?;
        Ok(token)
    }
}

/// Image posts route to `/photos`, text posts to `/feed`
fn publish_endpoint(page_id: &str, has_image: bool) -> String {
    let path = if has_image { "photos" } else { "feed" };
    format!("{}/{}/{}", GRAPH_BASE, page_id, path)
}

/// Graph errors come as `{"error":{"message":...}}`; fall back to the raw
/// body when the shape is unexpected
fn extract_graph_error(body: &str) -> String {
    #[derive(Deserialize)]
    struct GraphError {
        error: GraphErrorInner,
    }
    #[derive(Deserialize)]
    struct GraphErrorInner {
        message: String,
    }

    match serde_json::from_str::<GraphError>(body) {
        Ok(e) => e.error.message,
        Err(_) => format!("Facebook API error: {}", body),
    }
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    id: String,
    #[serde(default)]
    post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LongLivedToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug)]
pub enum FacebookError {
    Http(reqwest::Error),
    Api(String),
}

impl From<reqwest::Error> for FacebookError {
    fn from(e: reqwest::Error) -> Self {
        FacebookError::Http(e)
    }
}

impl std::fmt::Display for FacebookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacebookError::Http(e) => write!(f, "HTTP error: {}", e),
            FacebookError::Api(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for FacebookError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_routing_by_image_presence() {
        assert_eq!(
            publish_endpoint("12345", false),
            "https://graph.facebook.com/v18.0/12345/feed"
        );
        assert_eq!(
            publish_endpoint("12345", true),
            "https://graph.facebook.com/v18.0/12345/photos"
        );
    }

    #[test]
    fn test_extract_graph_error() {
        let body = r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190}}"#;
        assert_eq!(extract_graph_error(body), "Invalid OAuth access token.");

        let garbled = "<html>bad gateway</html>";
        assert!(extract_graph_error(garbled).contains("bad gateway"));
    }
}
