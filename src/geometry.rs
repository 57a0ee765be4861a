//! Rectangle and polygon primitives shared by the vision pipeline.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates (top-left + size).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> i64 {
        if self.w <= 0 || self.h <= 0 {
            return 0;
        }
        self.w as i64 * self.h as i64
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2, self.y + self.h / 2)
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.right(), self.y),
            Point::new(self.x, self.bottom()),
            Point::new(self.right(), self.bottom()),
        ]
    }

    /// Intersection with another rectangle; zero-sized when disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let w = self.right().min(other.right()) - x;
        let h = self.bottom().min(other.bottom()) - y;
        if w <= 0 || h <= 0 {
            return Rect::default();
        }
        Rect::new(x, y, w, h)
    }
}

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Intersection-over-union of two rectangles.
///
/// Returns 0 when the rectangles do not overlap or either has
/// non-positive area.
pub fn iou(a: &Rect, b: &Rect) -> f32 {
    let inter = a.intersect(b).area();
    if inter == 0 {
        return 0.0;
    }
    let union = a.area() + b.area() - inter;
    if union <= 0 {
        return 0.0;
    }
    inter as f32 / union as f32
}

/// Even-odd ray test; boundary points count as inside.
pub fn point_in_polygon(poly: &[Point], p: Point) -> bool {
    if poly.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let (a, b) = (poly[i], poly[j]);
        if on_segment(a, b, p) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            // Cross product comparison avoids the division of the
            // classic slope form and stays exact in integers.
            let cross = (b.x - a.x) as i64 * (p.y - a.y) as i64
                - (b.y - a.y) as i64 * (p.x - a.x) as i64;
            let crosses = if b.y > a.y { cross > 0 } else { cross < 0 };
            if crosses {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross =
        (b.x - a.x) as i64 * (p.y - a.y) as i64 - (b.y - a.y) as i64 * (p.x - a.x) as i64;
    if cross != 0 {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// A box counts as inside a polygon when its center is inside or any of
/// its four corners is, tolerating boxes that straddle a seat boundary.
pub fn box_in_polygon(poly: &[Point], rect: &Rect) -> bool {
    if poly.len() < 3 {
        return false;
    }
    if point_in_polygon(poly, rect.center()) {
        return true;
    }
    rect.corners().iter().any(|c| point_in_polygon(poly, *c))
}

/// Bounding rectangle of a polygon; zero-sized for degenerate input.
pub fn polygon_bounding_rect(poly: &[Point]) -> Rect {
    if poly.is_empty() {
        return Rect::default();
    }
    let min_x = poly.iter().map(|p| p.x).min().unwrap_or(0);
    let min_y = poly.iter().map(|p| p.y).min().unwrap_or(0);
    let max_x = poly.iter().map(|p| p.x).max().unwrap_or(0);
    let max_y = poly.iter().map(|p| p.y).max().unwrap_or(0);
    Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_rects_is_one() {
        let r = Rect::new(10, 10, 40, 40);
        assert!((iou(&r, &r) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_rects_is_zero() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 10, 10);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_of_degenerate_rect_is_zero() {
        let a = Rect::new(0, 0, 0, 10);
        let b = Rect::new(0, 0, 10, 10);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_half_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 0, 10, 10);
        // inter = 50, union = 150
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn point_in_square() {
        let poly = [
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        assert!(point_in_polygon(&poly, Point::new(5, 5)));
        assert!(point_in_polygon(&poly, Point::new(0, 5)));
        assert!(!point_in_polygon(&poly, Point::new(11, 5)));
        assert!(!point_in_polygon(&poly, Point::new(-1, -1)));
    }

    #[test]
    fn point_in_concave_polygon() {
        // L-shape: notch at the top right.
        let poly = [
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 4),
            Point::new(6, 4),
            Point::new(6, 10),
            Point::new(0, 10),
        ];
        assert!(point_in_polygon(&poly, Point::new(2, 8)));
        assert!(!point_in_polygon(&poly, Point::new(8, 8)));
    }

    #[test]
    fn box_straddling_boundary_counts_as_inside() {
        let poly = [
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        // Center outside, one corner inside.
        let rect = Rect::new(8, 8, 10, 10);
        assert!(box_in_polygon(&poly, &rect));
        // Fully outside.
        let rect = Rect::new(20, 20, 4, 4);
        assert!(!box_in_polygon(&poly, &rect));
    }

    #[test]
    fn bounding_rect_of_triangle() {
        let poly = [Point::new(2, 3), Point::new(10, 5), Point::new(4, 12)];
        assert_eq!(polygon_bounding_rect(&poly), Rect::new(2, 3, 8, 9));
    }
}
