use image::RgbImage;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Opaque URL identifying a source image.
pub type ImageRef = String;

/// Cell of a layout, in canvas pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Width/height ratio used by the cover-fit crop.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn intersection_area(&self, other: &Rect) -> u64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= left || bottom <= top {
            return 0;
        }

        (right - left) as u64 * (bottom - top) as u64
    }
}

/// A decoded raster shared between the image cache and running compositions.
#[derive(Clone)]
pub struct DecodedImage {
    pixels: Arc<RgbImage>,
}

impl DecodedImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Decoded size in bytes, used to bound the cache.
    pub fn byte_size(&self) -> usize {
        self.pixels.as_raw().len()
    }

    pub fn ptr_eq(&self, other: &DecodedImage) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollageFormat {
    #[default]
    Jpeg,
    Webp,
}

impl CollageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollageFormat::Jpeg => "jpeg",
            CollageFormat::Webp => "webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            CollageFormat::Jpeg => "jpg",
            CollageFormat::Webp => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            CollageFormat::Jpeg => "image/jpeg",
            CollageFormat::Webp => "image/webp",
        }
    }
}

impl FromStr for CollageFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpeg" | "jpg" => Ok(CollageFormat::Jpeg),
            "webp" => Ok(CollageFormat::Webp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CollageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encoded collage, owned by the caller until uploaded or dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollageResult {
    pub bytes: Vec<u8>,
    pub format: CollageFormat,
    /// Number of cells that received an image; the rest show background.
    pub drawn: usize,
    pub cells: usize,
}

impl CollageResult {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollageError {
    #[error("No layout for {0} images (supported: 1..=6)")]
    UnsupportedImageCount(usize),
    #[error("Canvas {width}x{height} is too small for a six image layout")]
    CanvasTooSmall { width: u32, height: u32 },
    #[error("Image encoding error: {0}")]
    EncodeError(#[from] image::ImageError),
    #[error("Render task failed: {0}")]
    RenderTaskFailed(String),
}

pub type CollageOutcome<T> = Result<T, CollageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 360, 446);
        let b = Rect::new(360, 0, 360, 446);
        let c = Rect::new(100, 100, 360, 446);

        assert_eq!(a.intersection_area(&b), 0);
        assert_eq!(a.intersection_area(&c), 260 * 346);
        assert_eq!(c.intersection_area(&a), 260 * 346);
        assert_eq!(a.intersection_area(&a), a.area());
    }

    #[test]
    fn test_collage_format_parsing() {
        assert_eq!("jpeg".parse::<CollageFormat>(), Ok(CollageFormat::Jpeg));
        assert_eq!("jpg".parse::<CollageFormat>(), Ok(CollageFormat::Jpeg));
        assert_eq!("webp".parse::<CollageFormat>(), Ok(CollageFormat::Webp));
        assert_eq!("gif".parse::<CollageFormat>(), Err(()));
        assert_eq!(CollageFormat::Webp.content_type(), "image/webp");
        assert_eq!(format!("{}", CollageFormat::Jpeg), "jpeg");
    }
}
