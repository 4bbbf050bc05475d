use image::{Rgb, RgbImage};
use log::debug;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Reusable fixed-size drawing surfaces.
///
/// A checked-out surface belongs to exactly one composition until its
/// [`PooledCanvas`] is dropped, at which point it is cleared and handed back.
#[derive(Clone)]
pub struct CanvasPool {
    width: u32,
    height: u32,
    max_idle: usize,
    idle: Arc<Mutex<Vec<RgbImage>>>,
    allocated: Arc<AtomicUsize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CanvasPoolStats {
    pub idle: usize,
    pub allocated: usize,
}

impl CanvasPool {
    pub fn new(width: u32, height: u32, max_idle: usize) -> Self {
        Self {
            width,
            height,
            max_idle,
            idle: Arc::new(Mutex::new(Vec::new())),
            allocated: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn checkout(&self) -> PooledCanvas {
        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());

        let canvas = match reused {
            Some(canvas) => canvas,
            None => {
                let total = self.allocated.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    "Allocating {}x{} canvas ({} total)",
                    self.width, self.height, total
                );
                RgbImage::new(self.width, self.height)
            }
        };

        PooledCanvas {
            canvas,
            pool: self.clone(),
        }
    }

    fn give_back(&self, mut canvas: RgbImage) {
        clear(&mut canvas);

        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(canvas);
                return;
            }
        }

        self.allocated.fetch_sub(1, Ordering::Relaxed);
        debug!("Canvas pool full, dropping surface");
    }

    pub fn stats(&self) -> CanvasPoolStats {
        CanvasPoolStats {
            idle: self.idle.lock().map(|idle| idle.len()).unwrap_or(0),
            allocated: self.allocated.load(Ordering::Relaxed),
        }
    }
}

fn clear(canvas: &mut RgbImage) {
    canvas.pixels_mut().for_each(|p| *p = Rgb([0, 0, 0]));
}

/// Exclusive handle on a pooled surface.
pub struct PooledCanvas {
    canvas: RgbImage,
    pool: CanvasPool,
}

impl PooledCanvas {
    pub fn fill_background(&mut self, color: Rgb<u8>) {
        self.pixels_mut().for_each(|p| *p = color);
    }
}

impl Deref for PooledCanvas {
    type Target = RgbImage;

    fn deref(&self) -> &RgbImage {
        &self.canvas
    }
}

impl DerefMut for PooledCanvas {
    fn deref_mut(&mut self) -> &mut RgbImage {
        &mut self.canvas
    }
}

impl Drop for PooledCanvas {
    fn drop(&mut self) {
        let canvas = std::mem::take(&mut self.canvas);
        self.pool.give_back(canvas);
    }
}
