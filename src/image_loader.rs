use async_trait::async_trait;
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::collage_types::{DecodedImage, ImageRef};
use crate::image_cache::ImageCache;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("Image decoding error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Image has no pixels")]
    EmptyImage,
    #[error("Fetch task failed: {0}")]
    Task(String),
}

/// Retrieves and decodes one image.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<DecodedImage, LoadError>;
}

pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, LoadError> {
    let pixels = image::load_from_memory(bytes)?.to_rgb8();
    if pixels.width() == 0 || pixels.height() == 0 {
        return Err(LoadError::EmptyImage);
    }
    Ok(DecodedImage::new(pixels))
}

/// Fetches images over HTTP(S) with a blocking `ureq` agent on the blocking pool.
#[derive(Clone)]
pub struct HttpImageFetcher {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: config.into(),
            max_bytes,
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<DecodedImage, LoadError> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let max_bytes = self.max_bytes;

        tokio::task::spawn_blocking(move || {
            let mut response = agent.get(&url).call()?;
            let bytes = response
                .body_mut()
                .with_config()
                .limit(max_bytes)
                .read_to_vec()?;
            decode_image(&bytes)
        })
        .await
        .map_err(|e| LoadError::Task(e.to_string()))?
    }
}

#[derive(Debug, Clone)]
pub struct LoaderSettings {
    /// Upper bound for fetching and decoding a single image.
    pub timeout: Duration,
    /// Images fetched concurrently per batch.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_pause: Duration,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            batch_size: 2,
            batch_pause: Duration::from_millis(100),
        }
    }
}

/// Loads images for collages, consulting the shared cache first.
///
/// Failures never propagate: a URL that times out or cannot be fetched or
/// decoded produces `None` in its slot and its siblings carry on.
#[derive(Clone)]
pub struct ImageLoader {
    fetcher: Arc<dyn ImageFetcher>,
    cache: ImageCache,
    settings: LoaderSettings,
}

impl ImageLoader {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, cache: ImageCache, settings: LoaderSettings) -> Self {
        Self {
            fetcher,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    /// Loads every URL, returning results in input order.
    pub async fn load_images(&self, urls: &[ImageRef]) -> Vec<Option<DecodedImage>> {
        let mut results: Vec<Option<DecodedImage>> = vec![None; urls.len()];
        let batch_size = self.settings.batch_size.max(1);

        for (batch_index, batch) in urls.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;
            debug!(
                "Loading batch: {} to {}",
                offset,
                offset + batch.len() - 1
            );

            let mut tasks = JoinSet::new();
            let mut fetched_any = false;

            for (i, url) in batch.iter().enumerate() {
                let index = offset + i;

                if let Some(image) = self.cache.get(url) {
                    debug!("Image {} from cache: {}", index, url);
                    results[index] = Some(image);
                    continue;
                }

                fetched_any = true;
                let loader = self.clone();
                let url = url.clone();
                tasks.spawn(async move { (index, loader.fetch_uncached(&url, index).await) });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, image)) => results[index] = image,
                    Err(e) => error!("Image load task panicked: {}", e),
                }
            }

            let more_batches = offset + batch.len() < urls.len();
            if fetched_any && more_batches && !self.settings.batch_pause.is_zero() {
                tokio::time::sleep(self.settings.batch_pause).await;
            }
        }

        results
    }

    async fn fetch_uncached(&self, url: &str, index: usize) -> Option<DecodedImage> {
        debug!("Loading image {}: {}", index, url);

        match tokio::time::timeout(self.settings.timeout, self.fetcher.fetch(url)).await {
            Ok(Ok(image)) => {
                debug!(
                    "Image {} loaded: {}x{}",
                    index,
                    image.width(),
                    image.height()
                );
                self.cache.put(url, image.clone());
                Some(image)
            }
            Ok(Err(e)) => {
                warn!("Image {} failed to load: {}: {}", index, url, e);
                None
            }
            Err(_) => {
                warn!(
                    "Image {} load timeout after {:?}: {}",
                    index, self.settings.timeout, url
                );
                None
            }
        }
    }

    /// Loads `urls` into the cache and reports how many are now cached.
    pub async fn warm(&self, urls: &[ImageRef]) -> usize {
        self.load_images(urls).await.iter().flatten().count()
    }

    /// Warms the cache in the background. Results and failures are discarded.
    pub fn preload(&self, urls: Vec<ImageRef>) {
        let loader = self.clone();
        tokio::spawn(async move {
            let cached = loader.warm(&urls).await;
            debug!("Preloaded {}/{} images", cached, urls.len());
        });
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
