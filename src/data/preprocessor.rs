// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns an encoded image (file on disk or raw bytes from an
// HTTP request) into the model's input layout.
//
// Steps (identical for training, evaluation and inference):
//   1. Decode (format guessed from content, not extension)
//   2. Convert to 8-bit RGB
//   3. Resize to (H, W) with bilinear filtering
//   4. [training only] random augmentation, see augment.rs
//   5. Rescale by 1/255 and lay out channel-first:
//
//      [R plane (H·W) | G plane (H·W) | B plane (H·W)]
//
// Steps 1-3 produce an RgbImage so augmentation can work in
// pixel space; step 5 is `to_chw`.
//
// Reference: image crate documentation

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, ImageReader, RgbImage};
use std::io::Cursor;
use std::path::Path;

use crate::config::ImageSize;

pub const RESCALE: f32 = 1.0 / 255.0;

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    size: ImageSize,
}

impl Preprocessor {
    pub fn new(size: ImageSize) -> Self {
        Self { size }
    }

    pub fn image_size(&self) -> ImageSize {
        self.size
    }

    /// Decode and resize an image file.
    pub fn load_path(&self, path: &Path) -> Result<RgbImage> {
        let img = ImageReader::open(path)
            .with_context(|| format!("Cannot open image '{}'", path.display()))?
            .with_guessed_format()?
            .decode()
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?;
        Ok(self.resize(img))
    }

    /// Decode and resize an in-memory encoded image.
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<RgbImage> {
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .decode()
            .context("Cannot decode image payload")?;
        Ok(self.resize(img))
    }

    fn resize(&self, img: DynamicImage) -> RgbImage {
        img.resize_exact(self.size.width as u32, self.size.height as u32, FilterType::Triangle)
            .to_rgb8()
    }

    /// Rescale to [0, 1] and lay out as CHW.
    pub fn to_chw(&self, img: &RgbImage) -> Vec<f32> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let plane  = w * h;
        let mut out = vec![0.0f32; 3 * plane];

        for (x, y, px) in img.enumerate_pixels() {
            let idx = y as usize * w + x as usize;
            for c in 0..3 {
                out[c * plane + idx] = px[c] as f32 * RESCALE;
            }
        }
        out
    }

    /// Path → CHW in one call (no augmentation).
    pub fn tensor_data_from_path(&self, path: &Path) -> Result<Vec<f32>> {
        Ok(self.to_chw(&self.load_path(path)?))
    }

    /// Bytes → CHW in one call (no augmentation).
    pub fn tensor_data_from_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        Ok(self.to_chw(&self.load_bytes(bytes)?))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};

    fn png_bytes(w: u32, h: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, Rgb(color));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_resize_and_rescale() {
        let pre  = Preprocessor::new(ImageSize::new(8, 6, 3));
        let data = pre.tensor_data_from_bytes(&png_bytes(20, 30, [255, 0, 51])).unwrap();

        assert_eq!(data.len(), 3 * 8 * 6);
        let plane = 8 * 6;
        // bilinear resampling of a flat colour can be off by one level
        assert!((data[0] - 1.0).abs() < 0.01);
        assert!(data[plane].abs() < 0.01);
        assert!((data[2 * plane] - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_grayscale_input_becomes_rgb() {
        let gray = image::GrayImage::from_pixel(4, 4, image::Luma([128]));
        let mut buf = Cursor::new(Vec::new());
        gray.write_to(&mut buf, ImageFormat::Png).unwrap();

        let pre = Preprocessor::new(ImageSize::new(4, 4, 3));
        assert_eq!(pre.load_bytes(buf.get_ref()).unwrap().dimensions(), (4, 4));
    }

    #[test]
    fn test_garbage_bytes_fail() {
        let pre = Preprocessor::new(ImageSize::new(4, 4, 3));
        assert!(pre.load_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn test_load_path_ignores_extension_case() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.PNG");
        std::fs::write(&path, png_bytes(5, 5, [0, 0, 0])).unwrap();

        let pre = Preprocessor::new(ImageSize::new(3, 3, 3));
        assert_eq!(pre.load_path(&path).unwrap().dimensions(), (3, 3));
    }
}
