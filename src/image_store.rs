use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::collage_types::ImageRef;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Image store rejected credential")]
    Unauthorized,
    #[error("Image store HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("Image store returned malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image store task failed: {0}")]
    Task(String),
}

/// Backend that owns wishlists and their images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// URLs of every image in the wishlist, in the store's order.
    async fn list_images(
        &self,
        wishlist_id: &str,
        credential: &str,
    ) -> Result<Vec<ImageRef>, StoreError>;

    /// Persists `cover_url` as the wishlist's cover. An empty URL clears it.
    async fn set_cover(
        &self,
        wishlist_id: &str,
        cover_url: &str,
        credential: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CoverUpdate<'a> {
    wishlist_id: &'a str,
    image_url: &'a str,
}

/// REST client for the wishlist API.
#[derive(Clone)]
pub struct HttpImageStore {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpImageStore {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: config.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn map_http_error(error: ureq::Error) -> StoreError {
    match error {
        ureq::Error::StatusCode(401) | ureq::Error::StatusCode(403) => StoreError::Unauthorized,
        other => StoreError::Http(other),
    }
}

fn parse_images(body: &str) -> Result<Vec<ImageRef>, StoreError> {
    let response: ImagesResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .into_iter()
        .filter(|url| !url.trim().is_empty())
        .collect())
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn list_images(
        &self,
        wishlist_id: &str,
        credential: &str,
    ) -> Result<Vec<ImageRef>, StoreError> {
        let agent = self.agent.clone();
        let url = format!("{}/wishes/images/{}", self.base_url, wishlist_id);
        let authorization = format!("Bearer {}", credential);

        tokio::task::spawn_blocking(move || {
            debug!("GET {}", url);
            let mut response = agent
                .get(&url)
                .header("Authorization", &authorization)
                .header("Accept", "application/json")
                .call()
                .map_err(map_http_error)?;
            let body = response.body_mut().read_to_string()?;
            parse_images(&body)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn set_cover(
        &self,
        wishlist_id: &str,
        cover_url: &str,
        credential: &str,
    ) -> Result<(), StoreError> {
        let agent = self.agent.clone();
        let url = format!("{}/wishlists/image", self.base_url);
        let authorization = format!("Bearer {}", credential);
        let body = serde_json::to_vec(&CoverUpdate {
            wishlist_id,
            image_url: cover_url,
        })?;

        tokio::task::spawn_blocking(move || {
            debug!("PATCH {}", url);
            agent
                .patch(&url)
                .header("Authorization", &authorization)
                .header("Content-Type", "application/json")
                .send(&body[..])
                .map_err(map_http_error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_images_response() {
        let body = r#"{"data": ["https://a/1.jpg", "", "https://a/2.jpg"], "message": "ok"}"#;
        assert_eq!(
            parse_images(body).unwrap(),
            vec!["https://a/1.jpg".to_string(), "https://a/2.jpg".to_string()]
        );
    }

    #[test]
    fn test_parse_images_without_data() {
        assert!(parse_images("{}").unwrap().is_empty());
        assert!(matches!(parse_images("[1,2"), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_cover_update_body() {
        let body = serde_json::to_value(CoverUpdate {
            wishlist_id: "42",
            image_url: "",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"wishlistId": "42", "imageUrl": ""}));
    }

    #[test]
    fn test_auth_status_maps_to_unauthorized() {
        assert!(matches!(
            map_http_error(ureq::Error::StatusCode(401)),
            StoreError::Unauthorized
        ));
        assert!(matches!(
            map_http_error(ureq::Error::StatusCode(500)),
            StoreError::Http(_)
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let store = HttpImageStore::new("https://api.example.com/", Duration::from_secs(1));
        assert_eq!(store.base_url, "https://api.example.com");
    }
}
