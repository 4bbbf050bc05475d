use crate::collage_types::{CollageError, CollageOutcome, Rect};

/// Collages never hold more images than this; extra URLs are dropped.
pub const MAX_COLLAGE_IMAGES: usize = 6;

pub const DEFAULT_CANVAS_WIDTH: u32 = 720;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 892;

/// Smallest canvas on which every layout still has non-empty cells.
pub const MIN_CANVAS_WIDTH: u32 = 2;
pub const MIN_CANVAS_HEIGHT: u32 = 3;

/// Precomputed partitions of one canvas size, one per supported image count.
///
/// Every layout tiles the canvas exactly. Splits that do not divide evenly
/// give the remainder to the right column or the bottom row.
#[derive(Debug, Clone)]
pub struct LayoutTable {
    width: u32,
    height: u32,
    layouts: [Vec<Rect>; MAX_COLLAGE_IMAGES],
}

impl LayoutTable {
    /// Builds the layouts for a `width` x `height` canvas, rejecting canvases
    /// too small to give every cell at least one pixel.
    pub fn new(width: u32, height: u32) -> CollageOutcome<Self> {
        if width < MIN_CANVAS_WIDTH || height < MIN_CANVAS_HEIGHT {
            return Err(CollageError::CanvasTooSmall { width, height });
        }
        Ok(Self::build(width, height))
    }

    fn build(width: u32, height: u32) -> Self {
        let half_w = width / 2;
        let half_h = height / 2;
        let right_w = width - half_w;
        let lower_h = height - half_h;

        // 2x2 block over the top 70% of the canvas, banner below
        let five_row = height * 7 / 20;
        let banner_y = five_row * 2;

        let third = height / 3;
        let last_third = height - third * 2;

        let layouts = [
            vec![Rect::new(0, 0, width, height)],
            vec![
                Rect::new(0, 0, width, half_h),
                Rect::new(0, half_h, width, lower_h),
            ],
            vec![
                Rect::new(0, 0, half_w, half_h),
                Rect::new(0, half_h, half_w, lower_h),
                Rect::new(half_w, 0, right_w, height),
            ],
            vec![
                Rect::new(0, 0, half_w, half_h),
                Rect::new(half_w, 0, right_w, half_h),
                Rect::new(0, half_h, half_w, lower_h),
                Rect::new(half_w, half_h, right_w, lower_h),
            ],
            vec![
                Rect::new(0, 0, half_w, five_row),
                Rect::new(half_w, 0, right_w, five_row),
                Rect::new(0, five_row, half_w, five_row),
                Rect::new(half_w, five_row, right_w, five_row),
                Rect::new(0, banner_y, width, height - banner_y),
            ],
            vec![
                Rect::new(0, 0, half_w, third),
                Rect::new(half_w, 0, right_w, third),
                Rect::new(0, third, half_w, third),
                Rect::new(half_w, third, right_w, third),
                Rect::new(0, third * 2, half_w, last_third),
                Rect::new(half_w, third * 2, right_w, last_third),
            ],
        ];

        Self {
            width,
            height,
            layouts,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the `n` cells for an `n`-image collage. Cell `i` belongs to image `i`.
    pub fn select(&self, n: usize) -> CollageOutcome<&[Rect]> {
        if n == 0 || n > MAX_COLLAGE_IMAGES {
            return Err(CollageError::UnsupportedImageCount(n));
        }
        Ok(&self.layouts[n - 1])
    }
}

impl Default for LayoutTable {
    fn default() -> Self {
        Self::build(DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tiles_canvas(table: &LayoutTable) {
        let canvas_area = table.width() as u64 * table.height() as u64;

        for n in 1..=MAX_COLLAGE_IMAGES {
            let cells = table.select(n).unwrap();
            assert_eq!(cells.len(), n);

            let total: u64 = cells.iter().map(Rect::area).sum();
            assert_eq!(total, canvas_area, "layout {} does not cover canvas", n);

            for (i, a) in cells.iter().enumerate() {
                assert!(a.width > 0 && a.height > 0);
                assert!(a.right() <= table.width() && a.bottom() <= table.height());
                for b in &cells[i + 1..] {
                    assert_eq!(a.intersection_area(b), 0, "overlap in layout {}", n);
                }
            }
        }
    }

    #[test]
    fn test_default_layouts_tile_canvas() {
        assert_tiles_canvas(&LayoutTable::default());
    }

    #[test]
    fn test_odd_canvas_layouts_tile_canvas() {
        assert_tiles_canvas(&LayoutTable::new(721, 893).unwrap());
        assert_tiles_canvas(&LayoutTable::new(101, 57).unwrap());
        assert_tiles_canvas(&LayoutTable::new(MIN_CANVAS_WIDTH, MIN_CANVAS_HEIGHT).unwrap());
    }

    #[test]
    fn test_tiny_canvas_is_rejected() {
        assert!(matches!(
            LayoutTable::new(1, 2),
            Err(CollageError::CanvasTooSmall {
                width: 1,
                height: 2
            })
        ));
        assert!(LayoutTable::new(720, 2).is_err());
        assert!(LayoutTable::new(1, 892).is_err());
    }

    #[test]
    fn test_default_layout_proportions() {
        let table = LayoutTable::default();

        assert_eq!(table.select(1).unwrap(), &[Rect::new(0, 0, 720, 892)]);
        assert_eq!(
            table.select(3).unwrap(),
            &[
                Rect::new(0, 0, 360, 446),
                Rect::new(0, 446, 360, 446),
                Rect::new(360, 0, 360, 892),
            ]
        );
        assert_eq!(
            table.select(5).unwrap(),
            &[
                Rect::new(0, 0, 360, 312),
                Rect::new(360, 0, 360, 312),
                Rect::new(0, 312, 360, 312),
                Rect::new(360, 312, 360, 312),
                Rect::new(0, 624, 720, 268),
            ]
        );

        let six = table.select(6).unwrap();
        assert_eq!(six[0], Rect::new(0, 0, 360, 297));
        assert_eq!(six[5], Rect::new(360, 594, 360, 298));
    }

    #[test]
    fn test_unsupported_counts_are_rejected() {
        let table = LayoutTable::default();

        assert!(matches!(
            table.select(0),
            Err(CollageError::UnsupportedImageCount(0))
        ));
        assert!(matches!(
            table.select(7),
            Err(CollageError::UnsupportedImageCount(7))
        ));
    }
}
