//! Instagram aspect-ratio compliance.
//!
//! Feed images must have `width / height` within `[0.8, 1.91]`. Anything
//! outside is center-cropped to the nearest bound. Ratio checks run in integer
//! arithmetic (`4:5` and `191:100`) so boundary images are never misjudged.

use crate::error::PublishResult;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

/// Lower bound of `width / height` (4:5 portrait)
pub const MIN_RATIO: f64 = 0.8;
/// Upper bound of `width / height` (1.91:1 landscape)
pub const MAX_RATIO: f64 = 1.91;

const JPEG_QUALITY: u8 = 90;

/// Centered crop window in source pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Crop needed to bring an image into range, or `None` when it already is.
///
/// - too tall (`r < 0.8`): height becomes `floor(width / 0.8)`
/// - too wide (`r > 1.91`): width becomes `floor(height * 1.91)`
pub fn plan_crop(width: u32, height: u32) -> Option<CropRect> {
    if width == 0 || height == 0 {
        return None;
    }
    let (w, h) = (u64::from(width), u64::from(height));

    if w * 5 < h * 4 {
        let new_height = (w * 5 / 4) as u32;
        Some(CropRect {
            left: 0,
            top: (height - new_height) / 2,
            width,
            height: new_height,
        })
    } else if w * 100 > h * 191 {
        let new_width = (h * 191 / 100) as u32;
        Some(CropRect {
            left: (width - new_width) / 2,
            top: 0,
            width: new_width,
            height,
        })
    } else {
        None
    }
}

/// Decode `bytes`, crop if out of range and re-encode as JPEG.
///
/// Returns `Ok(None)` when the image is already compliant.
pub fn fix_aspect_ratio(bytes: &[u8]) -> PublishResult<Option<Vec<u8>>> {
    let img = image::load_from_memory(bytes)?;
    let Some(rect) = plan_crop(img.width(), img.height()) else {
        return Ok(None);
    };

    let rgb = img
        .crop_imm(rect.left, rect.top, rect.width, rect.height)
        .to_rgb8();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(Some(out))
}
