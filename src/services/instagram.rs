//! Instagram publishing client
//!
//! Instagram posts are image-mandatory and publishing is two-phase: create
//! a media container for the image, then publish the container by its
//! creation id. Errors name the phase that failed.

use reqwest::Client;
use serde::Deserialize;

use crate::models::InstagramAuth;

const GRAPH_BASE: &str = "https://graph.facebook.com/v18.0";

#[derive(Clone)]
pub struct InstagramClient {
    http: Client,
}

impl InstagramClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Publish an image post to the credential's Instagram Business Account.
    /// A missing image fails validation before any request is sent.
    pub async fn publish(
        &self,
        auth: &InstagramAuth,
        caption: &str,
        image_url: Option<&str>,
    ) -> Result<String, InstagramError> {
        let image_url = image_url.ok_or(InstagramError::MissingImage)?;

        // Phase 1: create the media container
        let container_url = format!("{}/{}/media", GRAPH_BASE, auth.instagram_account_id);
        let resp = self
            .http
            .post(&container_url)
            .form(&[
                ("image_url", image_url),
                ("caption", caption),
                ("access_token", &auth.access_token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(InstagramError::Api {
                phase: "container creation",
                message: extract_graph_error(&text),
            });
        }

        let container: IdResponse = resp.json().await?;
        if container.id.is_empty() {
            return Err(InstagramError::Api {
                phase: "container creation",
                message: "No creation ID received".to_string(),
            });
        }

        // Phase 2: publish the container
        let publish_url = format!(
            "{}/{}/media_publish",
            GRAPH_BASE, auth.instagram_account_id
        );
        let resp = self
            .http
            .post(&publish_url)
            .form(&[
                ("creation_id", container.id.as_str()),
                ("access_token", &auth.access_token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(InstagramError::Api {
                phase: "media publish",
                message: extract_graph_error(&text),
            });
        }

        let published: IdResponse = resp.json().await?;
        Ok(published.id)
    }
}

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
        Err(_) => format!("Instagram API error: {}", body),
    }
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug)]
pub enum InstagramError {
    Http(reqwest::Error),
    MissingImage,
    Api {
        phase: &'static str,
        message: String,
    },
}

impl From<reqwest::Error> for InstagramError {
    fn from(e: reqwest::Error) -> Self {
        InstagramError::Http(e)
    }
}

impl std::fmt::Display for InstagramError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstagramError::Http(e) => write!(f, "HTTP error: {}", e),
            InstagramError::MissingImage => write!(f, "Instagram posts require an image."),
            InstagramError::Api { phase, message } => {
                write!(f, "Instagram {} failed: {}", phase, message)
            }
        }
    }
}

impl std::error::Error for InstagramError {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_missing_image_fails_without_network() {
        let client = InstagramClient::new(Client::new());
        let auth = InstagramAuth {
            access_token: "token".into(),
            instagram_account_id: "17841400000000000".into(),
            expires_at: Some(Utc::now() + chrono::Duration::days(30)),
        };

        // No image: must fail validation before any HTTP request. A network
        // attempt would surface as Http(..), never MissingImage.
        let err = client
            .publish(&auth, "caption", None)
            .await
            .expect_err("must fail");
        assert!(matches!(err, InstagramError::MissingImage));
        assert_eq!(err.to_string(), "Instagram posts require an image.");
    }

    #[test]
    fn test_phase_is_named_in_errors() {
        let err = InstagramError::Api {
            phase: "container creation",
            message: "Invalid image URL".into(),
        };
        assert_eq!(
            err.to_string(),
            "Instagram container creation failed: Invalid image URL"
        );
    }
}
