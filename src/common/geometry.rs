// SPDX-License-Identifier: GPL-2.0-or-later

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

pub type Polygon = Vec<Point>;

/// Axis-aligned detection bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// The representative point of a detection is the center of its box.
    #[must_use]
    pub fn centroid(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }
}

/// Returns true if point is inside the polygon.
///
/// Even-odd ray casting over the ordered vertex sequence. Points exactly
/// on an edge or vertex count as inside. Polygons with fewer than three
/// vertices contain nothing.
#[must_use]
pub fn contains_point(poly: &[Point], p: Point) -> bool {
    if poly.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        if on_segment(poly[j], poly[i], p) {
            return true;
        }
        let (pi, pj) = (poly[i], poly[j]);
        if ((pi.y > p.y) != (pj.y > p.y))
            && (p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

// Reports whether `p` lies on the segment between `a` and `b`.
fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross != 0.0 {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

#[allow(clippy::float_cmp)]
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn p(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    fn square() -> Polygon {
        vec![p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(0.0, 10.0)]
    }

    #[test_case(5.0, 5.0, true; "center")]
    #[test_case(0.1, 0.1, true; "near corner")]
    #[test_case(10.1, 5.0, false; "right of")]
    #[test_case(5.0, -0.1, false; "above")]
    #[test_case(-5.0, 5.0, false; "left of")]
    fn test_contains_point_square(x: f64, y: f64, inside: bool) {
        assert_eq!(inside, contains_point(&square(), p(x, y)));
    }

    // Boundary points count as inside.
    #[test_case(0.0, 0.0; "corner")]
    #[test_case(5.0, 0.0; "top edge")]
    #[test_case(10.0, 10.0; "far corner")]
    #[test_case(0.0, 7.5; "left edge")]
    fn test_contains_point_boundary(x: f64, y: f64) {
        assert!(contains_point(&square(), p(x, y)));
    }

    #[test]
    fn test_contains_point_concave() {
        // U-shape, open at the top.
        let poly = vec![
            p(0.0, 0.0),
            p(2.0, 0.0),
            p(2.0, 8.0),
            p(8.0, 8.0),
            p(8.0, 0.0),
            p(10.0, 0.0),
            p(10.0, 10.0),
            p(0.0, 10.0),
        ];
        assert!(contains_point(&poly, p(1.0, 5.0)));
        assert!(contains_point(&poly, p(9.0, 5.0)));
        assert!(contains_point(&poly, p(5.0, 9.0)));
        assert!(!contains_point(&poly, p(5.0, 5.0)));
    }

    #[test]
    fn test_contains_point_triangle() {
        let poly = vec![p(0.0, 0.0), p(10.0, 0.0), p(5.0, 10.0)];
        assert!(contains_point(&poly, p(5.0, 5.0)));
        assert!(!contains_point(&poly, p(0.5, 9.0)));
    }

    #[test]
    fn test_contains_point_degenerate() {
        assert!(!contains_point(&[], p(0.0, 0.0)));
        assert!(!contains_point(&[p(0.0, 0.0), p(1.0, 1.0)], p(0.5, 0.5)));
    }

    #[test]
    fn test_rect_centroid() {
        let rect = Rect {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
        };
        assert_eq!(p(25.0, 40.0), rect.centroid());
    }
}
