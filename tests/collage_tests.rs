use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use wish_cover::blob_uploader::LocalBlobUploader;
use wish_cover::collage_composer::{CollageComposer, CollageSettings};
use wish_cover::collage_types::{CollageFormat, DecodedImage, ImageRef, Rect};
use wish_cover::cover_orchestrator::{CoverOrchestrator, OrchestratorSettings};
use wish_cover::image_cache::ImageCache;
use wish_cover::image_loader::{decode_image, ImageFetcher, ImageLoader, LoadError, LoaderSettings};
use wish_cover::image_store::{ImageStore, StoreError};
use wish_cover::layout_selector::LayoutTable;

/// Encodes a solid PNG per URL so the real decoder is exercised.
struct PngFetcher {
    colors: HashMap<String, [u8; 3]>,
    fetches: Mutex<usize>,
}

impl PngFetcher {
    fn new(colors: &[(&str, [u8; 3])]) -> Self {
        Self {
            colors: colors
                .iter()
                .map(|(url, color)| (url.to_string(), *color))
                .collect(),
            fetches: Mutex::new(0),
        }
    }

    fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl ImageFetcher for PngFetcher {
    async fn fetch(&self, url: &str) -> Result<DecodedImage, LoadError> {
        *self.fetches.lock().unwrap() += 1;

        if url.contains("timeout") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }

        let Some(color) = self.colors.get(url) else {
            return decode_image(&[0u8; 16]);
        };

        let source = RgbImage::from_pixel(64, 48, Rgb(*color));
        let mut png = std::io::Cursor::new(Vec::new());
        source
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(LoadError::Decode)?;
        decode_image(png.get_ref())
    }
}

struct MemoryStore {
    images: Vec<ImageRef>,
    cover: Mutex<Option<String>>,
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn list_images(&self, _wishlist_id: &str, _credential: &str) -> Result<Vec<ImageRef>, StoreError> {
        Ok(self.images.clone())
    }

    async fn set_cover(&self, _wishlist_id: &str, cover_url: &str, _credential: &str) -> Result<(), StoreError> {
        *self.cover.lock().unwrap() = Some(cover_url.to_string());
        Ok(())
    }
}

const RED: [u8; 3] = [220, 30, 30];
const GREEN: [u8; 3] = [30, 200, 60];
const BLUE: [u8; 3] = [30, 60, 220];

fn settings() -> CollageSettings {
    CollageSettings {
        width: 120,
        height: 150,
        format: CollageFormat::Webp,
        pool_size: 1,
        ..CollageSettings::default()
    }
}

fn loader_settings() -> LoaderSettings {
    LoaderSettings {
        timeout: Duration::from_millis(150),
        batch_size: 2,
        batch_pause: Duration::from_millis(5),
    }
}

fn composer(fetcher: Arc<PngFetcher>) -> CollageComposer {
    let loader = ImageLoader::new(fetcher, ImageCache::new(32, 8), loader_settings());
    CollageComposer::new(loader, settings()).unwrap()
}

fn urls(items: &[&str]) -> Vec<ImageRef> {
    items.iter().map(|s| s.to_string()).collect()
}

fn cell_color(image: &RgbImage, cell: Rect) -> Rgb<u8> {
    *image.get_pixel(cell.x + cell.width / 2, cell.y + cell.height / 2)
}

fn near(pixel: Rgb<u8>, expected: [u8; 3]) -> bool {
    pixel.0.iter().zip(expected).all(|(a, b)| a.abs_diff(b) <= 2)
}

#[tokio::test]
async fn test_cells_follow_input_order() {
    let fetcher = Arc::new(PngFetcher::new(&[("r", RED), ("g", GREEN), ("b", BLUE)]));
    let composer = composer(fetcher);

    let result = composer
        .compose(&urls(&["r", "g", "b"]))
        .await
        .unwrap()
        .unwrap();
    let image = image::load_from_memory(&result.bytes).unwrap().to_rgb8();
    let cells = LayoutTable::new(120, 150).unwrap();
    let cells = cells.select(3).unwrap();

    assert!(near(cell_color(&image, cells[0]), RED));
    assert!(near(cell_color(&image, cells[1]), GREEN));
    assert!(near(cell_color(&image, cells[2]), BLUE));
}

#[tokio::test]
async fn test_timeout_leaves_blank_cell() {
    let fetcher = Arc::new(PngFetcher::new(&[("r", RED), ("g", GREEN), ("b", BLUE)]));
    let composer = composer(fetcher);

    let result = composer
        .compose(&urls(&["r", "timeout", "g", "b"]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.drawn, 3);

    let image = image::load_from_memory(&result.bytes).unwrap().to_rgb8();
    let cells = LayoutTable::new(120, 150).unwrap();
    let cells = cells.select(4).unwrap();

    assert!(near(cell_color(&image, cells[0]), RED));
    assert_eq!(cell_color(&image, cells[1]), Rgb([255, 255, 255]));
    assert!(near(cell_color(&image, cells[2]), GREEN));
    assert!(near(cell_color(&image, cells[3]), BLUE));
}

#[tokio::test]
async fn test_repeat_compose_hits_cache() {
    let fetcher = Arc::new(PngFetcher::new(&[("r", RED), ("g", GREEN)]));
    let composer = composer(fetcher.clone());
    let input = urls(&["r", "g"]);

    let first = composer.compose(&input).await.unwrap().unwrap();
    let second = composer.compose(&input).await.unwrap().unwrap();

    assert_eq!(fetcher.fetches(), 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_regenerate_with_local_uploads() {
    let temp_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(PngFetcher::new(&[("r", RED), ("g", GREEN)]));
    let store = Arc::new(MemoryStore {
        images: urls(&["r", "g"]),
        cover: Mutex::new(None),
    });
    let uploader = LocalBlobUploader::new(temp_dir.path().to_path_buf(), "http://localhost:18474/uploads");
    let orchestrator = CoverOrchestrator::new(
        store.clone(),
        Arc::new(uploader),
        composer(fetcher),
        OrchestratorSettings::default(),
    );

    let cover_url = orchestrator
        .regenerate_cover("15", "token")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(store.cover.lock().unwrap().as_deref(), Some(cover_url.as_str()));

    let key = cover_url
        .strip_prefix("http://localhost:18474/uploads/")
        .unwrap();
    assert!(key.starts_with("wish_img/"));
    assert!(key.contains("-collage-15-"));
    assert!(key.ends_with(".webp"));

    let stored = std::fs::read(temp_dir.path().join(key)).unwrap();
    let image = image::load_from_memory(&stored).unwrap();
    assert_eq!((image.width(), image.height()), (120, 150));
}
