use log::debug;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::collage_types::DecodedImage;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(128) {
    Some(n) => n,
    None => unreachable!(),
};

struct CacheState {
    entries: LruCache<String, DecodedImage>,
    current_size: usize,
}

/// Decoded images keyed by URL, shared by every loader clone.
///
/// Bounded by entry count and by decoded byte size; the least recently used
/// image is evicted first. Two loads racing on the same URL both insert, the
/// later one wins.
#[derive(Clone)]
pub struct ImageCache {
    state: Arc<Mutex<CacheState>>,
    max_size_bytes: usize,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ImageCacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub size_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

impl ImageCache {
    pub fn new(capacity: usize, max_size_mb: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);

        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                current_size: 0,
            })),
            max_size_bytes: max_size_mb * 1024 * 1024,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn get(&self, url: &str) -> Option<DecodedImage> {
        if let Ok(mut state) = self.state.lock() {
            if let Some(image) = state.entries.get(url) {
                debug!("Image cache hit for {}", url);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(image.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(&self, url: &str, image: DecodedImage) {
        let image_size = image.byte_size();

        if image_size > self.max_size_bytes {
            debug!(
                "Image too large for cache: {} ({} bytes)",
                url, image_size
            );
            return;
        }

        let Ok(mut state) = self.state.lock() else {
            return;
        };

        while state.current_size + image_size > self.max_size_bytes && !state.entries.is_empty() {
            match state.entries.pop_lru() {
                Some((evicted_url, evicted)) => {
                    state.current_size = state.current_size.saturating_sub(evicted.byte_size());
                    debug!("Evicted {} from image cache", evicted_url);
                }
                None => break,
            }
        }

        // push() hands back whatever it displaced: the old value for this URL
        // or the LRU entry when at capacity
        if let Some((_, displaced)) = state.entries.push(url.to_string(), image) {
            state.current_size = state.current_size.saturating_sub(displaced.byte_size());
        }
        state.current_size += image_size;

        debug!(
            "Cached {}, image cache size: {} bytes",
            url, state.current_size
        );
    }

    pub fn contains(&self, url: &str) -> bool {
        self.state
            .lock()
            .map(|state| state.entries.contains(url))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.clear();
            state.current_size = 0;
            debug!("Cleared image cache");
        }
    }

    pub fn stats(&self) -> ImageCacheStats {
        let (entries, capacity, size_bytes) = match self.state.lock() {
            Ok(state) => (
                state.entries.len(),
                state.entries.cap().get(),
                state.current_size,
            ),
            Err(_) => (0, 0, 0),
        };

        ImageCacheStats {
            entries,
            capacity,
            size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
