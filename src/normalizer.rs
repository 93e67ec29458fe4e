//! Crops an image to its visible pixels and pads it onto a transparent square.

use crate::error::{AssetError, Result};
use image::{imageops, DynamicImage, ImageBuffer, Rgba, RgbaImage};
use std::fs;
use std::path::Path;

/// Pixel rectangle in source coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub image: RgbaImage,
    pub side: u32,
}

impl NormalizedImage {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.image.save(path)?;
        Ok(())
    }
}

pub fn normalize_bytes(bytes: &[u8]) -> Result<NormalizedImage> {
    let img = image::load_from_memory(bytes)?;
    normalize(&img)
}

pub fn normalize_file(path: &Path) -> Result<NormalizedImage> {
    let img = image::open(path)?;
    normalize(&img)
}

pub fn normalize(img: &DynamicImage) -> Result<NormalizedImage> {
    let rgba = img.to_rgba8();
    let bbox = alpha_bbox(&rgba).ok_or(AssetError::EmptyImage)?;

    let cropped = imageops::crop_imm(&rgba, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
    let side = bbox.width.max(bbox.height);

    // Zeroed buffer is fully transparent
    let mut canvas = ImageBuffer::<Rgba<u8>, Vec<u8>>::new(side, side);

    let x_offset = (side - bbox.width) / 2;
    let y_offset = (side - bbox.height) / 2;

    // replace, not overlay: copy pixels verbatim instead of alpha blending them
    imageops::replace(&mut canvas, &cropped, x_offset as i64, y_offset as i64);

    Ok(NormalizedImage {
        image: canvas,
        side,
    })
}

/// Smallest rectangle holding every pixel with non-zero alpha.
pub fn alpha_bbox(img: &RgbaImage) -> Option<BoundingBox> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut found = false;

    for (x, y, pixel) in img.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        found = true;
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    found.then(|| BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn with_block(width: u32, height: u32, block: BoundingBox) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let inside = x >= block.x
                && x < block.x + block.width
                && y >= block.y
                && y < block.y + block.height;
            if inside {
                Rgba([200, 40, 10, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    fn png_bytes(img: &RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn wide_content_is_padded_vertically() {
        let block = BoundingBox { x: 10, y: 20, width: 30, height: 10 };
        let src = with_block(64, 64, block);

        let normalized = normalize_bytes(&png_bytes(&src)).unwrap();
        assert_eq!(normalized.side, 30);
        assert_eq!(normalized.image.dimensions(), (30, 30));

        // content occupies rows 10..20, everything else transparent
        for (_, y, pixel) in normalized.image.enumerate_pixels() {
            if (10..20).contains(&y) {
                assert_eq!(pixel[3], 255);
            } else {
                assert_eq!(pixel[3], 0);
            }
        }
    }

    #[test]
    fn tall_content_is_centered_horizontally() {
        let block = BoundingBox { x: 3, y: 1, width: 4, height: 9 };
        let normalized = normalize(&DynamicImage::ImageRgba8(with_block(12, 12, block))).unwrap();

        assert_eq!(normalized.side, 9);
        // (9 - 4) / 2 = 2 columns of padding on the left
        assert_eq!(normalized.image.get_pixel(1, 4)[3], 0);
        assert_eq!(normalized.image.get_pixel(2, 4)[3], 255);
        assert_eq!(normalized.image.get_pixel(5, 4)[3], 255);
        assert_eq!(normalized.image.get_pixel(6, 4)[3], 0);
    }

    #[test]
    fn semi_transparent_pixels_are_copied_verbatim() {
        let mut src = RgbaImage::new(5, 5);
        src.put_pixel(2, 2, Rgba([10, 20, 30, 77]));

        let normalized = normalize(&DynamicImage::ImageRgba8(src)).unwrap();
        assert_eq!(normalized.side, 1);
        assert_eq!(*normalized.image.get_pixel(0, 0), Rgba([10, 20, 30, 77]));
    }

    #[test]
    fn fully_transparent_is_empty() {
        let src = RgbaImage::new(16, 8);
        let err = normalize_bytes(&png_bytes(&src)).unwrap_err();
        assert!(matches!(err, AssetError::EmptyImage));
        assert!(err.is_invalid_image());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = normalize_bytes(b"definitely not a png").unwrap_err();
        assert!(matches!(err, AssetError::ImageError(_)));
    }

    #[test]
    fn bbox_of_single_corner_pixel() {
        let mut src = RgbaImage::new(4, 4);
        src.put_pixel(3, 0, Rgba([1, 1, 1, 1]));
        assert_eq!(
            alpha_bbox(&src),
            Some(BoundingBox { x: 3, y: 0, width: 1, height: 1 })
        );
    }
}
