//! Adaptive background model producing a per-frame foreground mask.
//!
//! The model is a per-pixel running average over luma with a fixed
//! deviation threshold. It is a deliberately cheap stand-in for heavier
//! mixture models: the pipeline only consumes region-level foreground
//! ratios as a low-confidence fallback signal, not the mask shape.
//!
//! The model is stateful and order-dependent. Feed it frames from one
//! source in monotonic temporal order; independent sources get
//! independent instances (the model is an owned object, never shared).

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::geometry::{point_in_polygon, polygon_bounding_rect, Point, Rect};

/// Tuning for the background model.
#[derive(Clone, Copy, Debug)]
pub struct BackgroundConfig {
    /// Effective history length in frames. Larger adapts slower.
    pub history: u32,
    /// Luma deviation beyond which a pixel is foreground.
    pub deviation_threshold: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            history: 500,
            deviation_threshold: 16.0,
        }
    }
}

/// Binary foreground mask aligned to the source frame.
#[derive(Clone, Debug)]
pub struct ForegroundMask {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl ForegroundMask {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn is_foreground(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return false;
        }
        self.data[y as usize * self.width as usize + x as usize] != 0
    }

    /// Fraction of foreground pixels inside a rectangle, clipped to the
    /// mask bounds. Empty intersections yield 0.
    pub fn ratio_in_rect(&self, roi: &Rect) -> f32 {
        let bounds = roi.intersect(&Rect::new(0, 0, self.width as i32, self.height as i32));
        if bounds.area() == 0 {
            return 0.0;
        }
        let mut fg = 0u64;
        for y in bounds.y..bounds.bottom() {
            for x in bounds.x..bounds.right() {
                if self.is_foreground(x, y) {
                    fg += 1;
                }
            }
        }
        fg as f32 / bounds.area() as f32
    }

    /// Fraction of foreground pixels inside a polygon, relative to the
    /// polygon's own pixel area.
    pub fn ratio_in_polygon(&self, poly: &[Point]) -> f32 {
        if poly.len() < 3 {
            return 0.0;
        }
        let bounds = polygon_bounding_rect(poly)
            .intersect(&Rect::new(0, 0, self.width as i32, self.height as i32));
        if bounds.area() == 0 {
            return 0.0;
        }
        let mut area = 0u64;
        let mut fg = 0u64;
        for y in bounds.y..=bounds.bottom() {
            for x in bounds.x..=bounds.right() {
                if !point_in_polygon(poly, Point::new(x, y)) {
                    continue;
                }
                area += 1;
                if self.is_foreground(x, y) {
                    fg += 1;
                }
            }
        }
        if area == 0 {
            return 0.0;
        }
        fg as f32 / area as f32
    }
}

/// Per-source adaptive background model.
pub struct BackgroundModel {
    config: BackgroundConfig,
    background: Vec<f32>,
    width: u32,
    height: u32,
    frames_seen: u64,
}

impl BackgroundModel {
    pub fn new(config: BackgroundConfig) -> Self {
        Self {
            config,
            background: Vec::new(),
            width: 0,
            height: 0,
            frames_seen: 0,
        }
    }

    /// Update the model with the next frame and return its foreground
    /// mask. The first frame seeds the background and yields an empty
    /// mask. A resolution change re-seeds the model.
    pub fn apply(&mut self, frame: &Frame) -> Result<ForegroundMask> {
        if frame.is_empty() {
            return Err(anyhow!("background model fed an empty frame"));
        }
        let (w, h) = (frame.width(), frame.height());
        let len = w as usize * h as usize;

        if self.background.len() != len {
            self.background = vec![0.0; len];
            for y in 0..h {
                for x in 0..w {
                    self.background[(y * w + x) as usize] = frame.luma_at(x, y) as f32;
                }
            }
            self.width = w;
            self.height = h;
            self.frames_seen = 1;
            return Ok(ForegroundMask {
                data: vec![0u8; len],
                width: w,
                height: h,
            });
        }

        // Warm-up adapts faster so the model converges before the
        // configured history takes over.
        let effective_history = self.frames_seen.min(self.config.history as u64).max(1);
        let alpha = 1.0 / effective_history as f32;

        let mut data = vec![0u8; len];
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                let luma = frame.luma_at(x, y) as f32;
                let bg = self.background[idx];
                if (luma - bg).abs() > self.config.deviation_threshold {
                    data[idx] = 255;
                }
                self.background[idx] = bg + alpha * (luma - bg);
            }
        }
        self.frames_seen += 1;
        Ok(ForegroundMask {
            data,
            width: w,
            height: h,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(w: u32, h: u32, value: u8) -> Frame {
        let mut frame = Frame::black(w, h);
        frame.pixels_mut().fill(value);
        frame
    }

    #[test]
    fn first_frame_yields_empty_mask() {
        let mut model = BackgroundModel::new(BackgroundConfig::default());
        let mask = model.apply(&flat_frame(8, 8, 100)).unwrap();
        assert_eq!(mask.ratio_in_rect(&Rect::new(0, 0, 8, 8)), 0.0);
    }

    #[test]
    fn sudden_change_is_foreground() {
        let mut model = BackgroundModel::new(BackgroundConfig::default());
        for _ in 0..5 {
            model.apply(&flat_frame(8, 8, 40)).unwrap();
        }
        let mask = model.apply(&flat_frame(8, 8, 200)).unwrap();
        let ratio = mask.ratio_in_rect(&Rect::new(0, 0, 8, 8));
        assert!(ratio > 0.99, "ratio was {ratio}");
    }

    #[test]
    fn static_scene_stays_background() {
        let mut model = BackgroundModel::new(BackgroundConfig::default());
        let mut last = 0.0;
        for _ in 0..10 {
            let mask = model.apply(&flat_frame(8, 8, 120)).unwrap();
            last = mask.ratio_in_rect(&Rect::new(0, 0, 8, 8));
        }
        assert_eq!(last, 0.0);
    }

    #[test]
    fn polygon_ratio_ignores_pixels_outside_polygon() {
        let mut model = BackgroundModel::new(BackgroundConfig::default());
        model.apply(&flat_frame(10, 10, 0)).unwrap();

        // Light up only the left half.
        let mut bright = Frame::black(10, 10);
        for y in 0..10u32 {
            for x in 0..5u32 {
                let idx = (y as usize * 10 + x as usize) * 3;
                bright.pixels_mut()[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        let mask = model.apply(&bright).unwrap();

        let left = [
            Point::new(0, 0),
            Point::new(4, 0),
            Point::new(4, 9),
            Point::new(0, 9),
        ];
        let right = [
            Point::new(6, 0),
            Point::new(9, 0),
            Point::new(9, 9),
            Point::new(6, 9),
        ];
        assert!(mask.ratio_in_polygon(&left) > 0.9);
        assert_eq!(mask.ratio_in_polygon(&right), 0.0);
    }
}
