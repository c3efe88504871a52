//! Cutting frames out of atlas bitmaps and compositing sheet cover thumbnails.

use crate::atlas::FrameRect;
use crate::error::{ResourceError, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::future::Future;

pub const DEFAULT_COVER_SIZE: u32 = 100;
const COVER_SAMPLES: usize = 4;

/// Copies `rect` out of `base`. Rotated frames are stored turned clockwise on the atlas and are
/// turned back 90° counter-clockwise. `base` is only read.
pub fn extract_region(base: &RgbaImage, rect: FrameRect, rotated: bool) -> Result<RgbaImage> {
    let (width, height) = base.dimensions();
    let fits = u64::from(rect.x) + u64::from(rect.w) <= u64::from(width)
        && u64::from(rect.y) + u64::from(rect.h) <= u64::from(height);
    if !fits || rect.w == 0 || rect.h == 0 {
        return Err(ResourceError::format(
            "atlas",
            format!(
                "frame rect {}x{}+{}+{} outside {}x{} bitmap",
                rect.w, rect.h, rect.x, rect.y, width, height
            ),
        ));
    }
    let region = imageops::crop_imm(base, rect.x, rect.y, rect.w, rect.h).to_image();
    Ok(if rotated { imageops::rotate270(&region) } else { region })
}

/// Frame indices used for a cover: every frame up to four, else four evenly spaced samples
/// starting at index 0.
pub fn cover_sample_indices(frame_count: usize) -> Vec<usize> {
    if frame_count <= COVER_SAMPLES {
        return (0..frame_count).collect();
    }
    (0..COVER_SAMPLES).map(|i| i * frame_count / COVER_SAMPLES).collect()
}

/// Builds a `size`x`size` thumbnail with up to four frames, one per quadrant in row-major order.
/// `frame` is asked for each sampled index in turn.
pub async fn compose_cover<F, Fut>(frame_count: usize, size: u32, mut frame: F) -> Result<RgbaImage>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<RgbaImage>>,
{
    if frame_count == 0 {
        return Err(ResourceError::EmptySheet);
    }
    let size = size.max(2);
    let quadrant = size / 2;
    let mut canvas = RgbaImage::new(size, size);
    for (slot, index) in cover_sample_indices(frame_count).into_iter().enumerate() {
        let image = frame(index).await?;
        let fitted = fit_within(&image, quadrant);
        let (fw, fh) = fitted.dimensions();
        let slot = slot as u32;
        let x = (slot % 2) * quadrant + (quadrant - fw) / 2;
        let y = (slot / 2) * quadrant + (quadrant - fh) / 2;
        imageops::replace(&mut canvas, &fitted, i64::from(x), i64::from(y));
    }
    Ok(canvas)
}

/// Scales `image` to fit a `bound`x`bound` box, keeping its aspect ratio.
pub fn fit_within(image: &RgbaImage, bound: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return RgbaImage::new(1, 1);
    }
    let scale = f64::from(bound) / f64::from(width.max(height));
    let fw = ((f64::from(width) * scale).round() as u32).clamp(1, bound);
    let fh = ((f64::from(height) * scale).round() as u32).clamp(1, bound);
    if (fw, fh) == (width, height) {
        return image.clone();
    }
    imageops::resize(image, fw, fh, FilterType::Triangle)
}
