use log::{debug, error, info, warn};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::blob_uploader::{BlobUploader, UploadCategory, UploadError};
use crate::collage_composer::CollageComposer;
use crate::collage_types::CollageError;
use crate::image_store::{ImageStore, StoreError};
use crate::layout_selector::MAX_COLLAGE_IMAGES;

#[derive(Debug, thiserror::Error)]
pub enum CoverError {
    #[error("Image store error: {0}")]
    Store(#[from] StoreError),
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
    #[error("Collage error: {0}")]
    Collage(#[from] CollageError),
}

/// When a regeneration runs relative to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegenerationMode {
    /// Caller waits for the new cover URL.
    #[default]
    Immediate,
    /// Runs in the background; the caller only learns it was queued.
    Queued,
    /// Runs after an idle delay; failures become "no cover".
    Idle,
}

impl FromStr for RegenerationMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(RegenerationMode::Immediate),
            "queued" | "async" => Ok(RegenerationMode::Queued),
            "idle" | "low" => Ok(RegenerationMode::Idle),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub wishlist_id: String,
    pub success: bool,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Delay before an idle-priority regeneration starts.
    pub idle_delay: Duration,
    /// Pause between wishlists in a batch.
    pub batch_pause: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_secs(1),
            batch_pause: Duration::from_millis(100),
        }
    }
}

/// Keeps a wishlist's cover in sync with its images.
///
/// Concurrent runs for the same wishlist are not serialized; whichever
/// writes to the image store last wins.
#[derive(Clone)]
pub struct CoverOrchestrator {
    store: Arc<dyn ImageStore>,
    uploader: Arc<dyn BlobUploader>,
    composer: CollageComposer,
    settings: OrchestratorSettings,
}

impl CoverOrchestrator {
    pub fn new(
        store: Arc<dyn ImageStore>,
        uploader: Arc<dyn BlobUploader>,
        composer: CollageComposer,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            uploader,
            composer,
            settings,
        }
    }

    pub fn composer(&self) -> &CollageComposer {
        &self.composer
    }

    /// Rebuilds and stores the cover for `wishlist_id`.
    ///
    /// Returns the new cover URL, or `None` after clearing the cover when the
    /// wishlist has no images. Store and upload failures are returned as-is.
    pub async fn regenerate_cover(
        &self,
        wishlist_id: &str,
        credential: &str,
    ) -> Result<Option<String>, CoverError> {
        let urls = self.store.list_images(wishlist_id, credential).await?;
        debug!("Wishlist {} has {} images", wishlist_id, urls.len());

        let collage = match self.composer.compose(&urls).await? {
            Some(collage) => collage,
            None => {
                info!("Wishlist {} has no images, clearing cover", wishlist_id);
                self.store.set_cover(wishlist_id, "", credential).await?;
                return Ok(None);
            }
        };

        let file_name = format!(
            "collage_{}_{}.{}",
            wishlist_id,
            chrono::Utc::now().timestamp_millis(),
            collage.format.extension()
        );
        let content_type = collage.content_type();
        let blob = self
            .uploader
            .upload(collage.bytes, &file_name, content_type, UploadCategory::Wish)
            .await?;

        self.store
            .set_cover(wishlist_id, &blob.url, credential)
            .await?;

        info!("Updated cover for wishlist {}: {}", wishlist_id, blob.url);
        Ok(Some(blob.url))
    }

    /// Starts a regeneration in the background and returns right away.
    pub fn regenerate_cover_queued(&self, wishlist_id: &str, credential: &str) {
        let orchestrator = self.clone();
        let wishlist_id = wishlist_id.to_string();
        let credential = credential.to_string();

        tokio::spawn(async move {
            if let Err(e) = orchestrator
                .regenerate_cover(&wishlist_id, &credential)
                .await
            {
                warn!(
                    "Queued cover generation for wishlist {} failed: {}",
                    wishlist_id, e
                );
            }
        });
    }

    /// Waits for the idle delay, then regenerates. Failures are logged and
    /// reported as `None`.
    pub async fn regenerate_cover_low_priority(
        &self,
        wishlist_id: &str,
        credential: &str,
    ) -> Option<String> {
        match self.regenerate_when_idle(wishlist_id, credential).await {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    "Low priority cover generation for wishlist {} failed: {}",
                    wishlist_id, e
                );
                None
            }
        }
    }

    async fn regenerate_when_idle(
        &self,
        wishlist_id: &str,
        credential: &str,
    ) -> Result<Option<String>, CoverError> {
        tokio::time::sleep(self.settings.idle_delay).await;
        self.regenerate_cover(wishlist_id, credential).await
    }

    /// Regenerates covers one wishlist at a time at idle priority, pausing in
    /// between. Unlike `regenerate_cover_low_priority`, errors are kept so the
    /// outcome can tell a failure apart from a wishlist without images.
    pub async fn regenerate_covers_batch(
        &self,
        wishlist_ids: &[String],
        credential: &str,
    ) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(wishlist_ids.len());

        for (i, wishlist_id) in wishlist_ids.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.batch_pause).await;
            }

            let outcome = match self.regenerate_when_idle(wishlist_id, credential).await {
                Ok(cover_url) => BatchOutcome {
                    wishlist_id: wishlist_id.clone(),
                    success: true,
                    cover_url,
                },
                Err(e) => {
                    error!(
                        "Failed to generate collage for wishlist {}: {}",
                        wishlist_id, e
                    );
                    BatchOutcome {
                        wishlist_id: wishlist_id.clone(),
                        success: false,
                        cover_url: None,
                    }
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Warms the image cache with the images a collage of this wishlist
    /// would use. Failures are logged and otherwise ignored.
    pub async fn preload_wishlist_images(&self, wishlist_id: &str, credential: &str) -> usize {
        match self.store.list_images(wishlist_id, credential).await {
            Ok(urls) => {
                let urls = &urls[..urls.len().min(MAX_COLLAGE_IMAGES)];
                self.composer.loader().warm(urls).await
            }
            Err(e) => {
                warn!(
                    "Failed to preload images for wishlist {}: {}",
                    wishlist_id, e
                );
                0
            }
        }
    }

    pub fn clear_cache(&self) {
        self.composer.loader().clear_cache();
    }
}
