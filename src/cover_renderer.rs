use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::collage_types::{DecodedImage, Rect};

/// Region of the source image that gets scaled into a target cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceCrop {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Computes the centered crop that lets a `src_width`x`src_height` image fill
/// `target` without letterboxing or distortion.
///
/// Relatively wider images lose equal strips on the left and right, narrower
/// ones lose equal strips on the top and bottom.
pub fn cover_crop(src_width: u32, src_height: u32, target: Rect) -> SourceCrop {
    let src_w = src_width as f64;
    let src_h = src_height as f64;
    let src_ratio = src_w / src_h;
    let dest_ratio = target.aspect_ratio();

    if src_ratio > dest_ratio {
        let width = src_h * dest_ratio;
        SourceCrop {
            x: (src_w - width) / 2.0,
            y: 0.0,
            width,
            height: src_h,
        }
    } else {
        let height = src_w / dest_ratio;
        SourceCrop {
            x: 0.0,
            y: (src_h - height) / 2.0,
            width: src_w,
            height,
        }
    }
}

/// Rounds a crop to whole source pixels, keeping it inside the image.
fn pixel_crop(crop: SourceCrop, src_width: u32, src_height: u32) -> (u32, u32, u32, u32) {
    let x = (crop.x.round() as u32).min(src_width.saturating_sub(1));
    let y = (crop.y.round() as u32).min(src_height.saturating_sub(1));
    let width = (crop.width.round() as u32).clamp(1, src_width - x);
    let height = (crop.height.round() as u32).clamp(1, src_height - y);
    (x, y, width, height)
}

/// Produces the pixels for one cell: the cover crop of `image` scaled to the
/// cell's size. Pure, so cells can be rendered in parallel.
pub fn render_cover_tile(image: &DecodedImage, target: Rect) -> RgbImage {
    let crop = cover_crop(image.width(), image.height(), target);
    let (x, y, width, height) = pixel_crop(crop, image.width(), image.height());

    let region = imageops::crop_imm(image.pixels(), x, y, width, height);
    imageops::resize(&*region, target.width, target.height, FilterType::Lanczos3)
}

/// Copies a rendered tile onto the canvas at the cell's position.
pub fn blit_tile(canvas: &mut RgbImage, tile: &RgbImage, target: Rect) {
    imageops::replace(canvas, tile, target.x as i64, target.y as i64);
}

/// Draws `image` into `target` with cover semantics. A missing image leaves
/// the cell untouched and returns `false`.
pub fn draw_cover(canvas: &mut RgbImage, image: Option<&DecodedImage>, target: Rect) -> bool {
    let Some(image) = image else {
        return false;
    };

    let tile = render_cover_tile(image, target);
    blit_tile(canvas, &tile, target);
    true
}
