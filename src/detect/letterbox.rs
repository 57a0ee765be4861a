//! Aspect-preserving resize with padding to the detector's square input.

use crate::detect::result::RawDetection;
use crate::frame::Frame;
use crate::geometry::Rect;

/// Parameters of a letterbox resize, enough to invert it.
#[derive(Clone, Copy, Debug)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub dx: u32,
    pub dy: u32,
    pub target: u32,
}

impl LetterboxTransform {
    /// Map a raw detection from padded input space back to source-frame
    /// pixel coordinates.
    pub fn unmap(&self, det: &RawDetection) -> Rect {
        let x = (det.cx - det.w * 0.5 - self.dx as f32) / self.scale;
        let y = (det.cy - det.h * 0.5 - self.dy as f32) / self.scale;
        let w = det.w / self.scale;
        let h = det.h / self.scale;
        Rect::new(
            x.round() as i32,
            y.round() as i32,
            w.round() as i32,
            h.round() as i32,
        )
    }
}

/// Resize `src` to fit a `target`x`target` square, preserving aspect
/// ratio and centering with black padding. Nearest-neighbor sampling;
/// the detector cares about content placement, not interpolation
/// quality.
pub fn letterbox(src: &Frame, target: u32) -> (Frame, LetterboxTransform) {
    let (w, h) = (src.width(), src.height());
    let scale = (target as f32 / w as f32).min(target as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).max(1).min(target);
    let new_h = ((h as f32 * scale).round() as u32).max(1).min(target);
    let dx = (target - new_w) / 2;
    let dy = (target - new_h) / 2;

    let mut canvas = Frame::black(target, target);
    for y in 0..new_h {
        let sy = ((y as f32 + 0.5) / scale) as u32;
        let sy = sy.min(h - 1);
        for x in 0..new_w {
            let sx = ((x as f32 + 0.5) / scale) as u32;
            let sx = sx.min(w - 1);
            let rgb = src.rgb_at(sx, sy);
            let idx = (((y + dy) * target + (x + dx)) * 3) as usize;
            canvas.pixels_mut()[idx..idx + 3].copy_from_slice(&rgb);
        }
    }

    (
        canvas,
        LetterboxTransform {
            scale,
            dx,
            dy,
            target,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_frame_pads_vertically() {
        let src = Frame::black(200, 100);
        let (out, t) = letterbox(&src, 64);
        assert_eq!(out.width(), 64);
        assert_eq!(out.height(), 64);
        assert_eq!(t.dx, 0);
        assert_eq!(t.dy, 16);
        assert!((t.scale - 0.32).abs() < 1e-6);
    }

    #[test]
    fn unmap_inverts_the_transform() {
        let src = Frame::black(200, 100);
        let (_, t) = letterbox(&src, 64);
        // A box centered at source (100, 50) sized 50x25 maps to input
        // center (32, 32) sized (16, 8).
        let det = RawDetection {
            cx: 32.0,
            cy: 32.0,
            w: 16.0,
            h: 8.0,
            conf: 0.9,
            cls_id: 0,
        };
        let rect = t.unmap(&det);
        assert_eq!(rect, Rect::new(75, 38, 50, 25));
    }

    #[test]
    fn square_input_is_pure_resize() {
        let src = Frame::black(128, 128);
        let (_, t) = letterbox(&src, 64);
        assert_eq!(t.dx, 0);
        assert_eq!(t.dy, 0);
        assert!((t.scale - 0.5).abs() < 1e-6);
    }
}
