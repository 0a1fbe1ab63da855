use image::imageops::{self, FilterType};
use image::RgbaImage;

/// A pixel rectangle that always lies inside its source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Builds a region from signed edge coordinates, clamping every edge to
    /// `[0, image_width] × [0, image_height]`.
    ///
    /// Negative or oversized edges are pulled back to the image border.
    /// Inverted edges (right < left) produce a zero-area region.
    pub fn clipped(
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let w = i64::from(image_width);
        let h = i64::from(image_height);

        let left = left.clamp(0, w);
        let top = top.clamp(0, h);
        let right = right.clamp(left, w);
        let bottom = bottom.clamp(top, h);

        Self {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Percentage edges of one area of the results screen.
#[derive(Clone, Copy, Debug)]
struct PercentRect {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl PercentRect {
    fn to_region(self, width: u32, height: u32) -> Region {
        let w = i64::from(width);
        let h = i64::from(height);
        Region::clipped(
            w * i64::from(self.left) / 100,
            h * i64::from(self.top) / 100,
            w * i64::from(self.right) / 100,
            h * i64::from(self.bottom) / 100,
            width,
            height,
        )
    }
}

/// Artist, song and charter lines in the top-left corner.
const TOP_LEFT: PercentRect = PercentRect { left: 0, top: 0, right: 30, bottom: 20 };
/// Total score and star rating above the player panels.
const CENTER: PercentRect = PercentRect { left: 30, top: 0, right: 70, bottom: 25 };
/// Player panels across the full width.
const PLAYERS: PercentRect = PercentRect { left: 0, top: 25, right: 100, bottom: 90 };

/// The three OCR areas of a results screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenRegions {
    pub top_left: Region,
    pub center: Region,
    pub players: Region,
}

/// Partitions an image of the given size into the fixed results-screen areas.
///
/// The layout is resolution independent: every edge is a fixed percentage
/// of the image size.
pub fn segment(width: u32, height: u32) -> ScreenRegions {
    ScreenRegions {
        top_left: TOP_LEFT.to_region(width, height),
        center: CENTER.to_region(width, height),
        players: PLAYERS.to_region(width, height),
    }
}

/// Copies a region out of an image.
///
/// The region is clamped again so a region computed for a different image
/// can never read out of bounds.
pub fn crop_region(img: &RgbaImage, region: &Region) -> RgbaImage {
    let (w, h) = img.dimensions();

    let x0 = region.x.min(w);
    let y0 = region.y.min(h);
    let rw = region.width.min(w - x0);
    let rh = region.height.min(h - y0);

    imageops::crop_imm(img, x0, y0, rw, rh).to_image()
}

/// Scales an image down proportionally so it fits inside `max_width` × `max_height`.
///
/// Uses one uniform scale factor (the smaller of the width and height
/// ratios) with bilinear filtering. Images that already fit, and a zero
/// maximum, leave the image untouched.
pub fn downscale_to_fit(img: RgbaImage, max_width: u32, max_height: u32) -> RgbaImage {
    let (width, height) = img.dimensions();
    if max_width == 0 || max_height == 0 || (width <= max_width && height <= max_height) {
        return img;
    }

    let scale = (f64::from(max_width) / f64::from(width))
        .min(f64::from(max_height) / f64::from(height));
    let new_width = ((f64::from(width) * scale) as u32).max(1);
    let new_height = ((f64::from(height) * scale) as u32).max(1);

    tracing::debug!(
        "Downscaling image {}x{} -> {}x{}",
        width,
        height,
        new_width,
        new_height
    );

    imageops::resize(&img, new_width, new_height, FilterType::Triangle)
}
