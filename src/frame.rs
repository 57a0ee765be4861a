//! Raw frame representation.
//!
//! Frames are tightly packed RGB8 buffers. Sources (image directories,
//! video decoders, synthetic generators) all normalize to this shape
//! before the classifier sees them; nothing downstream touches a decoder
//! type directly.

use anyhow::{anyhow, Result};

/// A decoded frame: tightly packed RGB8, row-major.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// A black frame, useful for padding and tests.
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            pixels: vec![0u8; width as usize * height as usize * 3],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGB triple at (x, y). Caller must stay in bounds.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    /// Integer luma approximation (Rec. 601 weights).
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        let [r, g, b] = self.rgb_at(x, y);
        ((r as u32 * 77 + g as u32 * 150 + b as u32 * 29) >> 8) as u8
    }

    /// Decode an image file into a frame.
    pub fn from_image_path(path: &std::path::Path) -> Result<Self> {
        let img = image::open(path)
            .map_err(|e| anyhow!("failed to decode image {}: {}", path.display(), e))?
            .into_rgb8();
        let (width, height) = img.dimensions();
        Frame::new(img.into_raw(), width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer_length() {
        assert!(Frame::new(vec![0u8; 10], 4, 4).is_err());
    }

    #[test]
    fn luma_of_white_is_near_max() {
        let mut frame = Frame::black(2, 2);
        frame.pixels_mut()[..3].copy_from_slice(&[255, 255, 255]);
        assert!(frame.luma_at(0, 0) >= 254);
        assert_eq!(frame.luma_at(1, 0), 0);
    }
}
