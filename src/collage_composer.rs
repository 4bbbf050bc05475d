use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use log::{debug, info};
use rayon::prelude::*;
use std::sync::Arc;

use crate::canvas_pool::{CanvasPool, PooledCanvas};
use crate::collage_types::{
    CollageError, CollageFormat, CollageOutcome, CollageResult, DecodedImage, ImageRef, Rect,
};
use crate::cover_renderer::{blit_tile, render_cover_tile};
use crate::image_loader::ImageLoader;
use crate::layout_selector::{
    LayoutTable, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, MAX_COLLAGE_IMAGES,
};

#[derive(Debug, Clone)]
pub struct CollageSettings {
    pub width: u32,
    pub height: u32,
    pub format: CollageFormat,
    /// JPEG quality, 1-100. Ignored for WebP, which is written lossless.
    pub jpeg_quality: u8,
    pub background: Rgb<u8>,
    /// Idle canvases kept for reuse.
    pub pool_size: usize,
}

impl Default for CollageSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
            format: CollageFormat::Jpeg,
            jpeg_quality: 85,
            background: Rgb([255, 255, 255]),
            pool_size: 4,
        }
    }
}

/// Builds cover collages out of up to six image URLs.
#[derive(Clone)]
pub struct CollageComposer {
    loader: ImageLoader,
    layouts: Arc<LayoutTable>,
    pool: CanvasPool,
    settings: CollageSettings,
}

impl CollageComposer {
    /// Fails with `CanvasTooSmall` when the configured canvas cannot hold
    /// every layout.
    pub fn new(loader: ImageLoader, settings: CollageSettings) -> CollageOutcome<Self> {
        let layouts = LayoutTable::new(settings.width, settings.height)?;

        Ok(Self {
            loader,
            layouts: Arc::new(layouts),
            pool: CanvasPool::new(settings.width, settings.height, settings.pool_size),
            settings,
        })
    }

    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    pub fn pool(&self) -> &CanvasPool {
        &self.pool
    }

    /// Composes a collage from the first six `urls`.
    ///
    /// Returns `Ok(None)` for empty input. Images that fail to load leave
    /// their cell filled with the background color; they never fail the call.
    pub async fn compose(&self, urls: &[ImageRef]) -> CollageOutcome<Option<CollageResult>> {
        if urls.len() > MAX_COLLAGE_IMAGES {
            debug!(
                "Using first {} of {} images for collage",
                MAX_COLLAGE_IMAGES,
                urls.len()
            );
        }
        let urls = &urls[..urls.len().min(MAX_COLLAGE_IMAGES)];

        if urls.is_empty() {
            info!("No images provided for collage");
            return Ok(None);
        }

        info!("Creating collage with {} images", urls.len());
        let positions = self.layouts.select(urls.len())?.to_vec();

        let images = self.loader.load_images(urls).await;

        let canvas = self.pool.checkout();
        let settings = self.settings.clone();
        let result = tokio::task::spawn_blocking(move || {
            render_collage(canvas, &images, &positions, &settings)
        })
        .await
        .map_err(|e| CollageError::RenderTaskFailed(e.to_string()))??;

        Ok(Some(result))
    }
}

/// Paints `images` into their cells on `canvas` and encodes the result.
///
/// The canvas goes back to its pool before this returns.
pub fn render_collage(
    mut canvas: PooledCanvas,
    images: &[Option<DecodedImage>],
    positions: &[Rect],
    settings: &CollageSettings,
) -> CollageOutcome<CollageResult> {
    canvas.fill_background(settings.background);

    let tiles: Vec<Option<RgbImage>> = images
        .par_iter()
        .zip(positions.par_iter())
        .map(|(image, cell)| image.as_ref().map(|image| render_cover_tile(image, *cell)))
        .collect();

    let mut drawn = 0;
    for (i, (tile, cell)) in tiles.iter().zip(positions).enumerate() {
        match tile {
            Some(tile) => {
                blit_tile(&mut canvas, tile, *cell);
                drawn += 1;
            }
            None => debug!("Skipping image {}: not loaded", i),
        }
    }

    info!("Drew {}/{} images", drawn, positions.len());

    let bytes = encode_canvas(&canvas, settings.format, settings.jpeg_quality)?;
    drop(canvas);

    debug!("Encoded collage: {} bytes", bytes.len());

    Ok(CollageResult {
        bytes,
        format: settings.format,
        drawn,
        cells: positions.len(),
    })
}

pub fn encode_canvas(
    canvas: &RgbImage,
    format: CollageFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    let (width, height) = canvas.dimensions();

    match format {
        CollageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut bytes, jpeg_quality.clamp(1, 100));
            encoder.write_image(canvas.as_raw(), width, height, ExtendedColorType::Rgb8)?;
        }
        CollageFormat::Webp => {
            let encoder = WebPEncoder::new_lossless(&mut bytes);
            encoder.write_image(canvas.as_raw(), width, height, ExtendedColorType::Rgb8)?;
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_cache::ImageCache;
    use crate::image_loader::tests::{fast_settings, FakeFetcher};

    fn composer(fetcher: Arc<FakeFetcher>, settings: CollageSettings) -> CollageComposer {
        let loader = ImageLoader::new(fetcher, ImageCache::new(64, 16), fast_settings());
        CollageComposer::new(loader, settings).unwrap()
    }

    fn small_settings(format: CollageFormat) -> CollageSettings {
        CollageSettings {
            width: 72,
            height: 90,
            format,
            pool_size: 1,
            ..CollageSettings::default()
        }
    }

    fn urls(items: &[&str]) -> Vec<ImageRef> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn decode(result: &CollageResult) -> RgbImage {
        image::load_from_memory(&result.bytes).unwrap().to_rgb8()
    }

    fn center_of(image: &RgbImage, cell: Rect) -> Rgb<u8> {
        *image.get_pixel(cell.x + cell.width / 2, cell.y + cell.height / 2)
    }

    fn is_white(pixel: Rgb<u8>) -> bool {
        pixel.0.iter().all(|c| *c > 235)
    }

    #[test]
    fn test_tiny_canvas_is_rejected() {
        let loader = ImageLoader::new(
            Arc::new(FakeFetcher::default()),
            ImageCache::new(8, 1),
            fast_settings(),
        );
        let settings = CollageSettings {
            width: 1,
            height: 2,
            ..CollageSettings::default()
        };

        assert!(matches!(
            CollageComposer::new(loader, settings),
            Err(CollageError::CanvasTooSmall {
                width: 1,
                height: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_empty_input_returns_none() {
        let fetcher = Arc::new(FakeFetcher::default());
        let composer = composer(fetcher.clone(), CollageSettings::default());

        assert!(composer.compose(&[]).await.unwrap().is_none());
        assert_eq!(fetcher.total_calls(), 0);
        assert_eq!(composer.pool().stats().allocated, 0);
    }

    #[tokio::test]
    async fn test_compose_full_size_jpeg() {
        let composer = composer(Arc::new(FakeFetcher::default()), CollageSettings::default());

        let result = composer
            .compose(&urls(&["a", "bb", "ccc"]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.content_type(), "image/jpeg");
        assert_eq!(result.drawn, 3);
        assert_eq!(result.cells, 3);
        assert_eq!(decode(&result).dimensions(), (720, 892));
        assert_eq!(composer.pool().stats().idle, 1);
    }

    #[tokio::test]
    async fn test_truncates_to_first_six_urls() {
        let fetcher = Arc::new(FakeFetcher::default());
        let composer = composer(fetcher.clone(), small_settings(CollageFormat::Webp));
        let all = urls(&["a", "bb", "ccc", "dddd", "eeeee", "ffffff", "g7", "h8"]);

        let truncated = composer.compose(&all).await.unwrap().unwrap();
        let first_six = composer.compose(&all[..6]).await.unwrap().unwrap();

        assert_eq!(truncated.cells, 6);
        assert_eq!(truncated, first_six);
        assert_eq!(fetcher.calls_for("g7"), 0);
        assert_eq!(fetcher.calls_for("h8"), 0);
    }

    #[tokio::test]
    async fn test_failed_image_leaves_background() {
        let composer = composer(Arc::new(FakeFetcher::default()), small_settings(CollageFormat::Jpeg));
        let layout = LayoutTable::new(72, 90).unwrap();
        let cells = layout.select(4).unwrap();

        let result = composer
            .compose(&urls(&["a", "slow-2", "ccc", "dddd"]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.drawn, 3);
        let image = decode(&result);
        assert!(is_white(center_of(&image, cells[1])));
        for i in [0, 2, 3] {
            assert!(!is_white(center_of(&image, cells[i])), "cell {} empty", i);
        }
    }

    #[tokio::test]
    async fn test_all_images_failing_still_returns_collage() {
        let composer = composer(Arc::new(FakeFetcher::default()), small_settings(CollageFormat::Webp));

        let result = composer
            .compose(&urls(&["broken-1", "broken-2"]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.drawn, 0);
        assert!(decode(&result).pixels().all(|p| *p == Rgb([255, 255, 255])));
    }

    #[tokio::test]
    async fn test_reused_canvas_has_no_residual_pixels() {
        let composer = composer(Arc::new(FakeFetcher::default()), small_settings(CollageFormat::Webp));
        let cells = LayoutTable::new(72, 90).unwrap();

        let first = composer.compose(&urls(&["a"])).await.unwrap().unwrap();
        assert!(!is_white(center_of(&decode(&first), cells.select(1).unwrap()[0])));

        let second = composer
            .compose(&urls(&["a", "broken"]))
            .await
            .unwrap()
            .unwrap();
        let image = decode(&second);
        let bottom = cells.select(2).unwrap()[1];

        for y in bottom.y..bottom.bottom() {
            for x in bottom.x..bottom.right() {
                assert_eq!(*image.get_pixel(x, y), Rgb([255, 255, 255]));
            }
        }
        assert_eq!(composer.pool().stats().allocated, 1);
    }

    #[test]
    fn test_encode_canvas_jpeg_quality_affects_size() {
        let mut canvas = RgbImage::new(64, 64);
        for (x, y, p) in canvas.enumerate_pixels_mut() {
            *p = Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 4) as u8]);
        }

        let low = encode_canvas(&canvas, CollageFormat::Jpeg, 20).unwrap();
        let high = encode_canvas(&canvas, CollageFormat::Jpeg, 95).unwrap();

        assert!(low.len() < high.len());
        assert_eq!(&high[..2], &[0xFF, 0xD8]);
    }
}
