use clokwerk::{Scheduler, TimeUnits};
use log::info;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::image_cache::ImageCache;

/// Periodically empties the decoded-image cache so edited source images get
/// picked up again.
pub struct CacheScheduler {
    cache: ImageCache,
    interval_hours: u32,
}

impl CacheScheduler {
    pub fn new(cache: ImageCache, interval_hours: u32) -> Self {
        Self {
            cache,
            interval_hours,
        }
    }

    /// Returns `None` when periodic clearing is disabled.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.interval_hours == 0 {
            info!("Periodic image cache clearing disabled");
            return None;
        }

        let mut scheduler = Scheduler::new();
        let cache = self.cache.clone();

        scheduler.every(self.interval_hours.hours()).run(move || {
            let stats = cache.stats();
            cache.clear();
            info!(
                "Scheduled image cache clear: dropped {} images ({} bytes)",
                stats.entries, stats.size_bytes
            );
        });

        let handle = thread::spawn(move || loop {
            scheduler.run_pending();
            thread::sleep(Duration::from_secs(60));
        });

        info!(
            "Image cache scheduler started, clearing every {} hours",
            self.interval_hours
        );
        Some(handle)
    }
}
